//! Catalog cache: PCs by row, students, teachers and batches.
//!
//! Each slice keeps its last-known-good value and a last-error slot, so a
//! partially failing refresh degrades that slice only. Reads hand out `Arc`
//! clones; bulk workflows pin one `CatalogSnapshot` for their whole run.
use crate::api::{ApiError, CatalogService};
use crate::model::{Batch, BatchRef, BookingError, Pc, Student, Teacher};
use futures::join;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct Slice<T> {
    value: Arc<T>,
    last_error: Option<String>,
}

impl<T: Default> Default for Slice<T> {
    fn default() -> Self {
        Self {
            value: Arc::new(T::default()),
            last_error: None,
        }
    }
}

impl<T> Slice<T> {
    fn apply(&mut self, name: &'static str, result: Result<T, ApiError>) {
        match result {
            Ok(value) => {
                self.value = Arc::new(value);
                self.last_error = None;
            }
            Err(err) => {
                warn!(slice = name, %err, "catalog refresh failed; keeping last known value");
                self.last_error = Some(err.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    pcs: Slice<BTreeMap<u32, Vec<Pc>>>,
    students: Slice<Vec<Student>>,
    teachers: Slice<Vec<Teacher>>,
    batches: Slice<Vec<Batch>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refetches the four slices concurrently. A failing slice keeps its
    /// last-known-good value; the error stays readable via [`Self::errors`].
    pub async fn refresh_all(&mut self, svc: &dyn CatalogService) {
        let (pcs, students, teachers, batches) = join!(
            svc.fetch_pcs_by_row(),
            svc.fetch_students(),
            svc.fetch_teachers(),
            svc.fetch_batches(),
        );
        self.pcs.apply("pcs", pcs);
        self.students.apply("students", students.map(filter_students));
        self.teachers.apply("teachers", teachers);
        self.batches.apply("batches", batches);
        info!(
            pcs = self.pcs.value.values().map(Vec::len).sum::<usize>(),
            students = self.students.value.len(),
            teachers = self.teachers.value.len(),
            batches = self.batches.value.len(),
            "catalog refreshed"
        );
    }

    /// PC-only refresh; PC status can change out of band, so the live
    /// update path refetches just this slice.
    pub async fn refresh_pcs(&mut self, svc: &dyn CatalogService) {
        self.pcs.apply("pcs", svc.fetch_pcs_by_row().await);
    }

    pub fn list_pcs_by_row(&self) -> Arc<BTreeMap<u32, Vec<Pc>>> {
        Arc::clone(&self.pcs.value)
    }

    pub fn list_students(&self) -> Arc<Vec<Student>> {
        Arc::clone(&self.students.value)
    }

    pub fn list_teachers(&self) -> Arc<Vec<Teacher>> {
        Arc::clone(&self.teachers.value)
    }

    pub fn list_batches(&self) -> Arc<Vec<Batch>> {
        Arc::clone(&self.batches.value)
    }

    /// Slice name and message for every slice whose last refresh failed.
    pub fn errors(&self) -> Vec<(&'static str, String)> {
        [
            ("pcs", &self.pcs.last_error),
            ("students", &self.students.last_error),
            ("teachers", &self.teachers.last_error),
            ("batches", &self.batches.last_error),
        ]
        .into_iter()
        .filter_map(|(name, err)| err.clone().map(|e| (name, e)))
        .collect()
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            pcs: Arc::clone(&self.pcs.value),
            students: Arc::clone(&self.students.value),
            teachers: Arc::clone(&self.teachers.value),
            batches: Arc::clone(&self.batches.value),
        }
    }
}

/// Records without both an id and a name are unusable downstream.
fn filter_students(students: Vec<Student>) -> Vec<Student> {
    students
        .into_iter()
        .filter(|s| {
            let valid = !s.id.trim().is_empty() && !s.name.trim().is_empty();
            if !valid {
                warn!(id = %s.id, name = %s.name, "dropping invalid student record");
            }
            valid
        })
        .collect()
}

/// An immutable view over all four slices, pinned at a point in time.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pcs: Arc<BTreeMap<u32, Vec<Pc>>>,
    students: Arc<Vec<Student>>,
    teachers: Arc<Vec<Teacher>>,
    batches: Arc<Vec<Batch>>,
}

/// A student together with the batch and teacher the catalog resolves for
/// them. Either side may be missing.
#[derive(Debug, Clone)]
pub struct StudentContext {
    pub student: Student,
    pub batch: Option<Batch>,
    pub teacher: Option<Teacher>,
}

impl CatalogSnapshot {
    pub fn pcs_by_row(&self) -> &BTreeMap<u32, Vec<Pc>> {
        &self.pcs
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn teachers(&self) -> &[Teacher] {
        &self.teachers
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn find_pc(&self, pc_id: &str) -> Option<&Pc> {
        self.pcs.values().flatten().find(|pc| pc.id == pc_id)
    }

    pub fn find_student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn find_teacher(&self, teacher_id: &str) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == teacher_id)
    }

    pub fn find_batch(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.id == batch_id)
    }

    pub fn students_in_batch(&self, batch_id: &str) -> Vec<&Student> {
        self.students
            .iter()
            .filter(|s| match &s.batch {
                BatchRef::Inline(b) => b.id == batch_id,
                BatchRef::Id(id) => id == batch_id,
                BatchRef::None => false,
            })
            .collect()
    }

    /// Resolves the batch and teacher for a student, in order: inline batch
    /// object, batch id, then the student's own teacher reference.
    pub fn resolve_student(&self, student_id: &str) -> Result<StudentContext, BookingError> {
        let student = self
            .find_student(student_id)
            .ok_or_else(|| BookingError::UnknownStudent(student_id.to_string()))?
            .clone();

        let (batch, teacher) = match &student.batch {
            BatchRef::Inline(batch) => {
                let teacher = batch
                    .teacher_id
                    .as_deref()
                    .and_then(|id| self.find_teacher(id))
                    .cloned();
                (Some(batch.clone()), teacher)
            }
            BatchRef::Id(batch_id) => match self.find_batch(batch_id) {
                Some(batch) => {
                    let teacher = batch
                        .teacher_id
                        .as_deref()
                        .and_then(|id| self.find_teacher(id))
                        .cloned();
                    (Some(batch.clone()), teacher)
                }
                None => (None, None),
            },
            BatchRef::None => {
                let teacher = student
                    .teacher_id
                    .as_deref()
                    .and_then(|id| self.find_teacher(id))
                    .cloned();
                (None, teacher)
            }
        };

        Ok(StudentContext {
            student,
            batch,
            teacher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PcStatus;
    use async_trait::async_trait;

    struct FakeCatalog {
        fail_students: bool,
    }

    fn pc(id: &str, number: u32, row: u32) -> Pc {
        Pc {
            id: id.into(),
            pc_number: number,
            row_number: row,
            status: PcStatus::Active,
        }
    }

    fn student(id: &str, name: &str, batch: BatchRef, teacher: Option<&str>) -> Student {
        Student {
            id: id.into(),
            name: name.into(),
            roll_number: None,
            batch,
            teacher_id: teacher.map(str::to_string),
            department: None,
        }
    }

    #[async_trait]
    impl CatalogService for FakeCatalog {
        async fn fetch_pcs_by_row(&self) -> Result<BTreeMap<u32, Vec<Pc>>, ApiError> {
            let mut rows = BTreeMap::new();
            rows.insert(1, vec![pc("p1", 1, 1), pc("p2", 2, 1)]);
            Ok(rows)
        }

        async fn fetch_students(&self) -> Result<Vec<Student>, ApiError> {
            if self.fail_students {
                return Err(ApiError::Backend {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(vec![
                student("s1", "Asha", BatchRef::None, None),
                student("", "Nameless", BatchRef::None, None),
                student("s2", "", BatchRef::None, None),
            ])
        }

        async fn fetch_teachers(&self) -> Result<Vec<Teacher>, ApiError> {
            Ok(vec![Teacher {
                id: "t1".into(),
                name: "Mr. Rao".into(),
            }])
        }

        async fn fetch_batches(&self) -> Result<Vec<Batch>, ApiError> {
            Ok(vec![Batch {
                id: "b1".into(),
                name: "Morning A".into(),
                teacher_id: Some("t1".into()),
                timing: None,
            }])
        }
    }

    #[tokio::test]
    async fn refresh_filters_invalid_students() {
        let mut cache = CatalogCache::new();
        cache.refresh_all(&FakeCatalog { fail_students: false }).await;
        let students = cache.list_students();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, "s1");
        assert!(cache.errors().is_empty());
    }

    #[tokio::test]
    async fn failed_slice_keeps_last_known_good() {
        let mut cache = CatalogCache::new();
        cache.refresh_all(&FakeCatalog { fail_students: false }).await;
        assert_eq!(cache.list_students().len(), 1);

        cache.refresh_all(&FakeCatalog { fail_students: true }).await;
        // students kept from the previous refresh, error recorded
        assert_eq!(cache.list_students().len(), 1);
        let errors = cache.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "students");
        // the healthy slices still refreshed
        assert_eq!(cache.list_teachers().len(), 1);
    }

    fn snapshot_with(students: Vec<Student>) -> CatalogSnapshot {
        CatalogSnapshot {
            pcs: Arc::new(BTreeMap::new()),
            students: Arc::new(students),
            teachers: Arc::new(vec![
                Teacher {
                    id: "t1".into(),
                    name: "Mr. Rao".into(),
                },
                Teacher {
                    id: "t2".into(),
                    name: "Ms. Iyer".into(),
                },
            ]),
            batches: Arc::new(vec![Batch {
                id: "b1".into(),
                name: "Morning A".into(),
                teacher_id: Some("t1".into()),
                timing: None,
            }]),
        }
    }

    #[test]
    fn resolve_prefers_inline_batch() {
        let inline = Batch {
            id: "b9".into(),
            name: "Inline".into(),
            teacher_id: Some("t2".into()),
            timing: None,
        };
        let snap = snapshot_with(vec![student(
            "s1",
            "Asha",
            BatchRef::Inline(inline),
            Some("t1"),
        )]);
        let ctx = snap.resolve_student("s1").unwrap();
        assert_eq!(ctx.batch.as_ref().unwrap().id, "b9");
        assert_eq!(ctx.teacher.as_ref().unwrap().id, "t2");
    }

    #[test]
    fn resolve_follows_batch_id_then_teacher() {
        let snap = snapshot_with(vec![student(
            "s1",
            "Asha",
            BatchRef::Id("b1".into()),
            None,
        )]);
        let ctx = snap.resolve_student("s1").unwrap();
        assert_eq!(ctx.batch.as_ref().unwrap().id, "b1");
        assert_eq!(ctx.teacher.as_ref().unwrap().id, "t1");
    }

    #[test]
    fn resolve_falls_back_to_direct_teacher() {
        let snap = snapshot_with(vec![student("s1", "Asha", BatchRef::None, Some("t2"))]);
        let ctx = snap.resolve_student("s1").unwrap();
        assert!(ctx.batch.is_none());
        assert_eq!(ctx.teacher.as_ref().unwrap().id, "t2");
    }

    #[test]
    fn resolve_unknown_student_errors() {
        let snap = snapshot_with(vec![]);
        assert!(matches!(
            snap.resolve_student("ghost"),
            Err(BookingError::UnknownStudent(_))
        ));
    }
}

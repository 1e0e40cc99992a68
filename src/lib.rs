//! Client-side domain engine for a training centre's computer-lab booking
//! board: catalog cache, slot selection, booking index, status projection,
//! bulk workflows and live-update dispatch over a JSON REST backend.
pub mod api;
pub mod board;
pub mod bulk;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod index;
pub mod model;
pub mod selector;
pub mod status;

//! Contact directory, fed by the sync pipeline.

pub mod model;
pub mod repository;

pub use model::Contact;
pub use repository::ContactRepository;

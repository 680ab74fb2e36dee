mod admin;
mod jobs;
mod media;
mod objects;
mod posts;

pub use admin::{admin_purge, health};
pub use jobs::{create_job, delete_job, get_job, machine_type, update_job};
pub use media::serve_media;
pub use objects::{download_object, upload_object, wipe_objects};
pub use posts::{create_post, delete_post, home, post_detail};

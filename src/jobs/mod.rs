// Jobs: submissions, submitted jobs and their tasks

mod manager;
mod submission;
mod submitted;
mod task;

pub use manager::{JobManager, DEFAULT_PER_CALL};
pub use submission::{JobFile, JobSubmission, MIN_AUTO_POOL_SIZE};
pub use submitted::{SubmittedJob, DEFAULT_LOG_LINES};
pub use task::{Task, TASK_OUTPUT, TASK_PREVIEW};

/// Random 8 hex digit `.png` file name
pub(crate) fn random_png_name() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}.png", &hex[..8])
}

//! 分发层：JobSubmission → JobDispatcher（提交 / 等待 / 轮询 / 取消）→ JobOutcome

pub mod dispatcher;
pub mod submission;

pub use dispatcher::{JobDispatcher, CANCEL_GRACE, CANCEL_REASON, MAX_POLL_ATTEMPTS};
pub use submission::{JobOutcome, JobSubmission, WaitPolicy};

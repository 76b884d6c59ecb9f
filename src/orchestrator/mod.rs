//! 编排器层：客户端抽象与实现（Bacalhau HTTP / Scripted）、任务文件、任务模板

pub mod bacalhau;
pub mod job_file;
pub mod mock;
pub mod templates;
pub mod traits;

pub use bacalhau::HttpOrchestrator;
pub use job_file::{fetch_job_file, parse_job_file};
pub use mock::{PollScript, ScriptedOrchestrator};
pub use templates::{JobTemplateBuilder, TemplateInputs};
pub use traits::{Execution, OrchestratorClient};

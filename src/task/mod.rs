//! 任务层：状态聚合根、单步结果与进度事件

pub mod events;
pub mod state;

pub use events::{StepView, TaskEvent};
pub use state::{
    assemble_response, Artifact, PendingArtifact, StepResult, TaskError, TaskRequest, TaskState,
    TaskStatus, Usage,
};

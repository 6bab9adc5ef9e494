mod job_workspace;

pub use job_workspace::{JobWorkspace, WorkspaceError};

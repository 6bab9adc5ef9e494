mod completion;
mod job_processor;
mod model_manager;
mod output_formatter;
mod retention_sweeper;
mod transcriber;
mod webhook_notifier;

pub use completion::{CompletionHub, TerminalEvent};
pub use job_processor::{
    run_startup_recovery, AdmissionSlot, JobProcessor, ProcessorHandle, QueueStatus,
    StageTimeouts,
};
pub use model_manager::{
    spawn_idle_watcher, ModelManager, ModelManagerError, ModelState, ModelStatus,
};
pub use output_formatter::{
    render_markdown, render_srt, render_txt, render_vtt, FormatterError, OutputFormatter,
};
pub use retention_sweeper::RetentionSweeper;
pub use transcriber::{Transcriber, TranscriberError};
pub use webhook_notifier::{WebhookError, WebhookNotifier};

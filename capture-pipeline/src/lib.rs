pub mod types;
pub mod traits;
pub mod broadcast;
pub mod decoder;
pub mod verify;
pub mod prompts;
pub mod llm_adapter;
pub mod enrichment;
pub mod summarizer;
pub mod frame_source;
pub mod controller;
pub mod config;
pub mod console;
pub mod server;

pub use types::*;
pub use broadcast::{BroadcastChannel, Delivery, Subscription};
pub use decoder::decode;
pub use verify::correlate;
pub use llm_adapter::{LlmAdapter, MockLlmAdapter, MockReply, OpenAiAdapter};
pub use enrichment::{LookupConfig, PokeApiLookup};
pub use summarizer::{RollingSummary, Summarizer, SummaryStep};
pub use frame_source::{ScreenFrameSource, StillFrameSource};
pub use controller::{CaptureController, IterationOutcome, LoopConfig, LoopState, StartOutcome};
pub use config::{Cli, PipelineConfig, Settings};
pub use traits::{FrameSource, LookupService};

pub mod assembler;
pub mod checkpoint;
pub mod conversation;
pub mod explain;
pub mod intent;
pub mod models;
pub mod reveal;
pub mod rules;

pub use assembler::{assemble, assemble_with_id, compile_prompt, next_campaign_id};
pub use checkpoint::Checkpoint;
pub use conversation::{collapse_snapshots, should_retitle, title_from_message};
pub use explain::{explain, ExplanationSlots};
pub use intent::{classify_campaign_intent, CampaignIntent, IntentSignals};
pub use models::*;
pub use reveal::{Artifact, Reveal, RevealStep};
pub use rules::{classify, AttributeSet, CampaignName, NameClass};

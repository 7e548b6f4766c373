// Library surface for the typing engine.
// Keep this lean: UI layers consume the engine through these modules only.
pub mod clock;
pub mod error;
pub mod event;
pub mod ghost;
pub mod locale;
pub mod player;
pub mod recorder;
pub mod runtime;
pub mod session;
pub mod source;
pub mod stats;
pub mod tokenizer;
pub mod util;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::Error;
pub use event::{TypingEntry, TypingEvent};
pub use ghost::{Ghost, GhostInfo, GhostManager, GhostOptions};
pub use locale::{LocaleDefinition, LocaleRegistry};
pub use player::{Player, PlayerOptions, PlayerState};
pub use recorder::{
    deserialize_recording, serialize_recording, Recorder, RecorderOptions, RecordingData,
    RecordingMetadata,
};
pub use runtime::{RuntimeOptions, SessionInput, SessionRuntime, SoundCue};
pub use session::{SessionState, Subscription, TypingSession, TypingSessionOptions};
pub use source::{create_text_source, TextSource, TextSourceFactory, TextSourceOptions};
pub use stats::{StatsSnapshot, StatsTracker};
pub use tokenizer::{tokenize_text, Token, TokenLanguage, TokenType};

//! Animatronic head host: timed servo instruction playback with override
//! merging, deduplication and serial transport.

pub mod config;
pub mod experience;
pub mod instructions;
pub mod motion;
pub mod scheduler;
pub mod servo;
pub mod transport;

pub use config::{HeadConfig, load_config};
pub use experience::{ExperienceController, ExperienceEvent, ExperienceState};
pub use instructions::{Instruction, InstructionSet, LoadError, TimedInstruction, Timeline};
pub use motion::{DispatchError, MotionController, MotionEvent};
pub use scheduler::{InstructionScheduler, SchedulerEvent, SchedulerId, SchedulerState};
pub use servo::{Phoneme, PhonemeMap, PositionEntry, Servo, ServoLimits, ServoPositions};
pub use transport::{NullTransport, SerialTransport, ServoTransport, TransportError};

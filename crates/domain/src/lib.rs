//! SceneSync domain: scene identity, the snapshot data model and the pure
//! scene resolver. No I/O and no async here.

pub mod error;
pub mod ids;
pub mod resolver;
pub mod scene;
pub mod snapshot;

pub use error::DomainError;
pub use ids::{CorrelationId, PostId, RoomId};
pub use resolver::{SceneGroup, SceneResolver, SceneTable};
pub use scene::{SceneIdentity, SceneTag, FALLBACK_SCENE_ID};
pub use snapshot::{CharacterEntry, PostEntry, SceneSnapshot, VoteEntry};

pub mod actor;
pub mod scene;

pub use actor::{ActorSnapshot, normalize_name};
pub use scene::SceneState;

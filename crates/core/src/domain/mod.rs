pub mod conversation;
pub mod intent;
pub mod tool;
pub mod workspace;

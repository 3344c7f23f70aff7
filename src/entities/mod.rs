pub mod container;
pub mod creature;
pub mod effects;
pub mod inventory;
pub mod item;
pub mod player;
pub mod skills;

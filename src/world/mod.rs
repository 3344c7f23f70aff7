pub mod item_types;
pub mod map;
pub mod movement;
pub mod object_types;
pub mod pathfinding;
pub mod position;
pub mod state;
pub mod tile;
pub mod time;
pub mod viewport;

pub mod append;
pub mod extract;
pub mod info;
pub mod strokes;

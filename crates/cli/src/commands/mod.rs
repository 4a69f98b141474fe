pub mod create;
pub mod down;
pub mod history;
pub mod new;
pub mod redo;
pub mod tables;
pub mod up;

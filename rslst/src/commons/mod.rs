pub mod basic_functions;
pub mod date_window;

pub use date_window::DateWindow;

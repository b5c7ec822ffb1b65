pub mod console_view;

pub use console_view::ConsoleView;

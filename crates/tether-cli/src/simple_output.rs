use std::io::{stdout, Write};

/// Simple output helper for printing messages
#[derive(Clone)]
pub struct SimpleOutput;

impl SimpleOutput {
    pub fn new() -> Self {
        SimpleOutput
    }

    pub fn print(&self, message: &str) {
        println!("{}", message);
    }

    pub fn print_inline(&self, message: &str) {
        print!("{}", message);
        let _ = stdout().flush();
    }
}

impl Default for SimpleOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by every method of a weaving run.
#[derive(Debug, Default)]
pub struct WeaveContext {
    next_suffix: u32,
}

impl WeaveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a name suffix that has not been handed out before in this run.
    pub fn fresh_suffix(&mut self) -> u32 {
        let suffix = self.next_suffix;
        self.next_suffix += 1;
        suffix
    }
}

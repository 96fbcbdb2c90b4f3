use huewatch::prelude::v1::*;
use std::io::{BufRead, Write};

/// Waits for the user to press enter before every cycle.
///
/// End of input stops the run.
pub struct PromptTrigger<R, W> {
    input: R,
    output: W,
    remaining: Option<usize>,
}

impl<R: BufRead, W: Write> PromptTrigger<R, W> {
    pub fn new(input: R, output: W, cycles: Option<usize>) -> Self {
        Self {
            input,
            output,
            remaining: cycles,
        }
    }
}

impl<R: BufRead, W: Write> CycleTrigger for PromptTrigger<R, W> {
    fn wait_for_begin(&mut self) -> Result<bool> {
        if !take_cycle(&mut self.remaining) {
            return Ok(false);
        }

        write!(
            self.output,
            "Press Enter to start one detection/recording cycle..."
        )?;
        self.output.flush()?;

        let mut line = String::new();
        Ok(self.input.read_line(&mut line)? > 0)
    }
}

/// Starts cycles back to back, optionally a limited number of times.
pub struct AutoTrigger {
    remaining: Option<usize>,
}

impl AutoTrigger {
    pub fn new(cycles: Option<usize>) -> Self {
        Self { remaining: cycles }
    }
}

impl CycleTrigger for AutoTrigger {
    fn wait_for_begin(&mut self) -> Result<bool> {
        Ok(take_cycle(&mut self.remaining))
    }
}

fn take_cycle(remaining: &mut Option<usize>) -> bool {
    match remaining {
        Some(0) => false,
        Some(n) => {
            *n -= 1;
            true
        }
        None => true,
    }
}

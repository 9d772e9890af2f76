//! Interactive disambiguation on a terminal.
//!
//! Questions go to the output stream (stderr for [`ConsolePrompt::stdio`]),
//! so stdout stays free for command output. End of input, an I/O error or
//! too many unreadable answers count as "skip".

use crate::domain::resolver::Candidate;
use crate::ports::disambiguation_port::DisambiguationPolicy;
use std::io::{self, BufRead, Stderr, StdinLock, Write};
use tracing::warn;

const MAX_ATTEMPTS: usize = 3;

enum Answer {
    Yes,
    No,
    Skip,
    Pick(usize),
}

pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
    skipped: bool,
}

impl ConsolePrompt<StdinLock<'static>, Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            skipped: false,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn read_answer(&mut self, question: &str, choices: usize) -> Answer {
        for _ in 0..MAX_ATTEMPTS {
            if write!(self.output, "{question} ").and_then(|_| self.output.flush()).is_err() {
                return Answer::Skip;
            }
            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return Answer::Skip,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "could not read answer");
                    return Answer::Skip;
                }
            }
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => return Answer::Yes,
                "n" | "no" => return Answer::No,
                "s" | "skip" => return Answer::Skip,
                other => {
                    if let Ok(n) = other.parse::<usize>() {
                        if (1..=choices).contains(&n) {
                            return Answer::Pick(n - 1);
                        }
                    }
                }
            }
            let _ = writeln!(self.output, "unrecognised answer");
        }
        Answer::Skip
    }
}

impl<R: BufRead, W: Write> DisambiguationPolicy for ConsolePrompt<R, W> {
    fn confirm(&mut self, query: &str, candidate: &Candidate) -> bool {
        let _ = writeln!(
            self.output,
            "\n{query:?} may be {:?} (score {:.3})",
            candidate.security.name, candidate.score
        );
        let answer = self.read_answer("same instrument? [y]es / [n]o, create new / [s]kip:", 0);
        self.skipped = matches!(answer, Answer::Skip);
        matches!(answer, Answer::Yes)
    }

    fn choose(&mut self, query: &str, candidates: &[Candidate]) -> Option<usize> {
        let _ = writeln!(self.output, "\n{query:?} matches several instruments:");
        for (i, c) in candidates.iter().enumerate() {
            let _ = writeln!(self.output, "  {}) {} (score {:.3})", i + 1, c.security.name, c.score);
        }
        let question = format!(
            "pick 1-{} / [n]one, create new / [s]kip:",
            candidates.len()
        );
        let answer = self.read_answer(&question, candidates.len());
        self.skipped = !matches!(answer, Answer::Pick(_) | Answer::No);
        match answer {
            Answer::Pick(i) => Some(i),
            _ => None,
        }
    }

    fn skip_declined(&self) -> bool {
        self.skipped
    }
}

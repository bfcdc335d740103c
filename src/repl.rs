use rustyline::{DefaultEditor, error::ReadlineError};

use crate::{
    diagnostics::{CrawlspaceError, Result},
    session::{Crawlspace, Session},
};

/// A local line-edited session over the same machinery remote clients use.
pub struct Repl {
    session: Session,
}

impl Repl {
    pub fn new(crawlspace: &Crawlspace) -> Self {
        Self {
            session: crawlspace.session(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        println!(
            "crawlspace registrations:\n{}",
            self.session.registrations().join(", ")
        );
        while !self.session.quit_requested() {
            match editor.readline("> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    let outcome = self.session.eval_line(trimmed);
                    print!("{}", self.session.take_output());
                    match outcome {
                        Ok(results) => {
                            for value in results {
                                println!("{value:?}");
                            }
                        }
                        Err(err) => eprintln!("{err}"),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }
}

fn readline_error(err: ReadlineError) -> CrawlspaceError {
    CrawlspaceError::from(std::io::Error::other(err))
}

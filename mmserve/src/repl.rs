//! Line-oriented interactive front end.
//!
//! Stands in for the editor collaborator at the query boundary: each
//! line is one request, each response is plain text. The real wire
//! protocol lives in the editor glue, not here.

use crate::service::Service;
use std::io::{self, BufRead, Write};
use std::path::Path;

const HELP: &str = "commands:
  definition <label>     where a label is declared
  hover <label>          hypotheses, conclusion and comment of a label
  show <label>           render the stored proof as a worksheet
  diags <path>           diagnostics for a database file or worksheet
  open <path>            load a worksheet file into the service
  unify <path> <line>    unify the worksheet step at a line
  dv                     toggle distinct-variable hints
  quit";

pub fn run(service: &Service) -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let cmd = match words.next() {
            Some(cmd) => cmd,
            None => continue,
        };
        match (cmd, words.next()) {
            ("quit", _) | ("exit", _) => break,
            ("definition", Some(label)) => match service.definition(label) {
                Some(loc) => writeln!(out, "{}:{}", loc.path.display(), loc.start)?,
                None => writeln!(out, "{}: not found", label)?,
            },
            ("hover", Some(label)) => match service.hover(label) {
                Some(info) => write!(out, "{}", info.render())?,
                None => writeln!(out, "{}: not found", label)?,
            },
            ("show", Some(label)) => match service.show_proof(label) {
                Some(Ok(text)) => write!(out, "{}", text)?,
                Some(Err(err)) => match service.snapshot() {
                    Some(snap) => writeln!(out, "{}: {}", label, err.message(&snap.db.names))?,
                    None => writeln!(out, "{}: no database", label)?,
                },
                None => writeln!(out, "{}: not a theorem", label)?,
            },
            ("diags", Some(path)) => {
                for d in service.diagnostics(Path::new(path), true) {
                    writeln!(
                        out,
                        "{}:{}:{}: {:?}: {}",
                        path,
                        d.line + 1,
                        d.start_col + 1,
                        d.severity,
                        d.message
                    )?;
                }
            }
            ("open", Some(path)) => match std::fs::read_to_string(path) {
                Ok(text) => {
                    service.open(path, text);
                    writeln!(out, "opened {}", path)?;
                }
                Err(err) => writeln!(out, "{}: {}", path, err)?,
            },
            ("unify", Some(path)) => {
                let line_no = words.next().and_then(|w| w.parse::<usize>().ok());
                match line_no {
                    Some(n) => match service.unify_step(Path::new(path), n) {
                        Ok(done) => writeln!(out, "{}", done.text)?,
                        Err(failure) => match service.snapshot() {
                            Some(snap) => {
                                writeln!(out, "{}", failure.message(&snap.db.names))?
                            }
                            None => writeln!(out, "no database")?,
                        },
                    },
                    None => writeln!(out, "usage: unify <path> <line>")?,
                }
            }
            ("dv", _) => {
                let on = service.toggle_dv_hints();
                writeln!(out, "dv hints {}", if on { "on" } else { "off" })?;
            }
            _ => writeln!(out, "{}", HELP)?,
        }
        out.flush()?;
    }
    Ok(())
}

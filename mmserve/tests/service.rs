//! End-to-end tests of the query service: snapshot freshness,
//! cancellation of superseded reparses, and worksheet diagnostics.

use metamath_parse::{Loader, MemLoader};
use mmserve::service::{Phase, Service};
use mmserve::Workspace;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAIN: &str = r"
$c wff |- ( ) -> $.
$v p q $.
wp $f wff p $.
wq $f wff q $.
wi $a wff ( p -> q ) $.
$( The principle of identity. $)
ax-1 $a wff p -> p $.
";

fn service(files: &[(&str, &str)]) -> Service {
    let mut loader = MemLoader::default();
    for (path, text) in files {
        loader = loader.file(*path, *text);
    }
    Service::new(Workspace::new("main.mm").with_jobs(2), Box::new(loader)).unwrap()
}

/// Loader that takes a while, so that in-flight reparses can reliably
/// be superseded by a later edit.
struct SlowLoader {
    inner: MemLoader,
    delay: Duration,
}

impl Loader for SlowLoader {
    fn load(&self, path: &Path) -> io::Result<String> {
        std::thread::sleep(self.delay);
        self.inner.load(path)
    }

    fn resolve(&self, from: &Path, include: &str) -> PathBuf {
        self.inner.resolve(from, include)
    }
}

#[test]
fn definition_and_hover_of_an_axiom() {
    let service = service(&[("main.mm", MAIN)]);
    let snap = service.snapshot_fresh().unwrap();
    assert_eq!(snap.db.diagnostics().count(), 0);

    let loc = service.definition("ax-1").unwrap();
    assert_eq!(loc.path, Path::new("main.mm"));
    assert_eq!(loc.start.line, 7);

    let hover = service.hover("ax-1").unwrap();
    assert_eq!(hover.typecode, "wff");
    assert_eq!(hover.hypotheses, Vec::<String>::new());
    assert_eq!(hover.conclusion, "p -> p");
    assert_eq!(hover.comment.as_deref(), Some("The principle of identity."));

    assert!(service.definition("ax-2").is_none());
}

#[test]
fn missing_root_is_a_startup_error() {
    let loader = MemLoader::default();
    assert!(Service::new(Workspace::new("main.mm"), Box::new(loader)).is_err());
}

#[test]
fn stale_queries_answer_from_the_last_snapshot() {
    let loader = SlowLoader {
        inner: MemLoader::default().file("main.mm", MAIN),
        delay: Duration::from_millis(150),
    };
    let service = Service::new(Workspace::new("main.mm"), Box::new(loader)).unwrap();
    service.snapshot_fresh().unwrap();

    // break the variable declarations; until the reparse publishes,
    // plain queries keep answering from the last good snapshot
    service.edit("main.mm", MAIN.replace("$v p q $.", ""));
    assert!(service.definition("ax-1").is_some());
    assert!(matches!(
        service.phase(Path::new("main.mm")),
        Phase::Stale | Phase::Parsing
    ));

    // a fresh query waits for the reparse
    let diags = service.diagnostics(Path::new("main.mm"), true);
    assert!(!diags.is_empty());
    assert!(service.definition("ax-1").is_none());
    assert_eq!(service.phase(Path::new("main.mm")), Phase::Ready);
}

#[test]
fn edits_supersede_in_flight_reparses() {
    let loader = SlowLoader {
        inner: MemLoader::default().file("main.mm", MAIN),
        delay: Duration::from_millis(100),
    };
    let service = Service::new(Workspace::new("main.mm").with_jobs(2), Box::new(loader)).unwrap();

    service.edit("main.mm", MAIN.replace("ax-1", "ax-first"));
    service.edit("main.mm", MAIN.replace("ax-1", "ax-second"));

    let snap = service.snapshot_fresh().unwrap();
    assert!(snap.db.lookup("ax-second").is_some());
    assert!(snap.db.lookup("ax-first").is_none());

    // the superseded job must never overwrite the newer snapshot,
    // even once it has had ample time to finish
    std::thread::sleep(Duration::from_millis(400));
    let snap = service.snapshot().unwrap();
    assert!(snap.db.lookup("ax-second").is_some());
    assert!(snap.db.lookup("ax-first").is_none());
}

#[test]
fn worksheets_diagnose_against_the_database() {
    let service = service(&[("main.mm", MAIN)]);
    service.snapshot_fresh().unwrap();

    let sheet = "$( <MM> <PROOF_ASST> THEOREM=ax-1  LOC_AFTER=?\n\
                 qed::ax-1 wff p -> p\n\
                 $)\n";
    service.open("proof.mmp", sheet);
    assert_eq!(service.diagnostics(Path::new("proof.mmp"), true), []);

    // a step formula the citation cannot produce
    service.edit("proof.mmp", sheet.replace("wff p -> p", "wff p -> q"));
    let diags = service.diagnostics(Path::new("proof.mmp"), true);
    assert!(diags
        .iter()
        .any(|d| d.message.contains("inconsistent binding")));
}

#[test]
fn unify_completes_a_worksheet_step() {
    let service = service(&[("main.mm", MAIN)]);
    service.snapshot_fresh().unwrap();

    let sheet = "$( <MM> <PROOF_ASST> THEOREM=ax-1  LOC_AFTER=?\n\
                 qed::ax-1\n\
                 $)\n";
    service.open("proof.mmp", sheet);
    service.sheet_fresh(Path::new("proof.mmp")).unwrap();
    let done = service.unify_step(Path::new("proof.mmp"), 1).unwrap();
    assert_eq!(done.text, "qed::ax-1 wff p -> p");
}

#[test]
fn publication_pushes_diagnostics_events() {
    let service = service(&[("main.mm", MAIN)]);
    let events = service.subscribe();
    service.snapshot_fresh().unwrap();
    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.doc, Path::new("main.mm"));
    assert_eq!(event.diagnostics, []);
}

#[test]
fn dv_hints_toggle() {
    let service = service(&[("main.mm", MAIN)]);
    assert!(service.toggle_dv_hints());
    assert!(service.dv_hints());
    assert!(!service.toggle_dv_hints());
}

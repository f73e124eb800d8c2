//! The scrap tool: generate a random directory corpus from the command line.

use std::path::PathBuf;

use crate::corpus::{Corpus, CorpusSpec, generate};
use crate::error::Result;

pub const PROG: &str = "scrap_dir_tree";

#[derive(Debug, Clone)]
pub struct ScrapOptions {
    pub rootname: PathBuf,
    pub breadth: usize,
    pub depth: usize,
    /// Without a seed the tree is different every time.
    pub seed: Option<u64>,
    pub wipe: bool,
    /// Copied into every created directory.
    pub files: Vec<PathBuf>,
}

pub fn run(opts: &ScrapOptions) -> Result<Corpus> {
    tracing::debug!("Make max {} levels of directories", opts.depth);
    tracing::debug!("Make max {} directories per level", opts.breadth);
    let seed = opts.seed.unwrap_or_else(|| {
        tracing::debug!("No pseudo-random seed given: using a random one");
        rand::random()
    });
    tracing::debug!("Creating scrap directories");
    generate(&CorpusSpec {
        root: opts.rootname.clone(),
        breadth: opts.breadth,
        depth: opts.depth,
        seed_files: opts.files.clone(),
        seed,
        wipe: opts.wipe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn seeded_scrap_trees_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let seed_file = dir.path().join("x.h");
        fs::write(&seed_file, "#define X\n").unwrap();
        let opts = ScrapOptions {
            rootname: dir.path().join("scrap"),
            breadth: 3,
            depth: 2,
            seed: Some(42),
            wipe: true,
            files: vec![seed_file],
        };
        let a = run(&opts).unwrap();
        let b = run(&opts).unwrap();
        assert_eq!(a.relative_dirs(), b.relative_dirs());
        assert_eq!(a.files_created(), a.dirs_created());
    }
}

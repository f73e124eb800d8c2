//! Randomised directory corpora for stressing recursive traversal.
//!
//! A corpus is a tree of randomly named directories, every one of which
//! receives a copy of each seed file. The shape is bounded by a
//! (breadth, depth) budget: each directory tries `breadth` children, and
//! each child recurses with `(breadth - 1, depth - 1)`, so the tree stays
//! far smaller than `breadth^depth`. Names are bounded too: a child name is
//! at most `128 - len(parent path)` characters.
//!
//! All randomness comes from one generator seeded up front, so the same
//! seed over the same root always yields the same tree.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{HarnessError, IoContext, Result};

/// Characters corpus directory names are drawn from.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

/// Upper bound on the length of a generated path.
pub const MAX_PATH_LEN: usize = 128;

/// One generated directory and everything beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusNode {
    pub path: PathBuf,
    /// Seed files copied into this directory.
    pub files: Vec<PathBuf>,
    pub children: Vec<CorpusNode>,
}

impl CorpusNode {
    /// Directories in this subtree, this node included.
    pub fn dir_count(&self) -> usize {
        1 + self.children.iter().map(CorpusNode::dir_count).sum::<usize>()
    }

    /// Files in this subtree.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.children.iter().map(CorpusNode::file_count).sum::<usize>()
    }

    /// All nodes of the subtree in depth-first order.
    pub fn iter(&self) -> impl Iterator<Item = &CorpusNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// A generated corpus. The root directory itself is not counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    pub root: PathBuf,
    pub top: Vec<CorpusNode>,
}

impl Corpus {
    pub fn dirs_created(&self) -> usize {
        self.top.iter().map(CorpusNode::dir_count).sum()
    }

    pub fn files_created(&self) -> usize {
        self.top.iter().map(CorpusNode::file_count).sum()
    }

    /// Paths of every created directory relative to the root.
    pub fn relative_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .top
            .iter()
            .flat_map(CorpusNode::iter)
            .filter_map(|n| n.path.strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs
    }
}

/// Parameters of one corpus generation.
#[derive(Debug, Clone)]
pub struct CorpusSpec {
    pub root: PathBuf,
    pub breadth: usize,
    pub depth: usize,
    pub seed_files: Vec<PathBuf>,
    pub seed: u64,
    /// Delete an existing root first instead of failing.
    pub wipe: bool,
}

/// Builds a corpus according to a [`CorpusSpec`].
pub struct CorpusGenerator {
    rng: ChaCha8Rng,
    seed_files: Vec<PathBuf>,
}

impl CorpusGenerator {
    pub fn new(seed: u64, seed_files: Vec<PathBuf>) -> Self {
        CorpusGenerator {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed_files,
        }
    }

    /// A name of uniformly random length in `[0, max_len]`.
    fn scrap_name(&mut self, max_len: usize) -> String {
        let len = self.rng.gen_range(0..=max_len);
        (0..len)
            .map(|_| *ALPHABET.choose(&mut self.rng).unwrap_or(&b'_') as char)
            .collect()
    }

    /// Populate `path` with up to `breadth` random children, recursively.
    pub fn gen_dirs(&mut self, path: &Path, breadth: usize, depth: usize) -> Result<Vec<CorpusNode>> {
        let mut made = Vec::new();
        if breadth == 0 || depth == 0 {
            return Ok(made);
        }
        let parent_len = path.as_os_str().len();
        for _ in 0..breadth {
            let Some(max_len) = MAX_PATH_LEN.checked_sub(parent_len).filter(|&n| n >= 1) else {
                break;
            };
            let name = self.scrap_name(max_len);
            if name.is_empty() {
                continue;
            }
            let next = path.join(&name);
            if next.is_dir() {
                continue;
            }
            fs::create_dir_all(&next).with_path("failed to create directory", &next)?;
            tracing::debug!("Made directory: \"{}\"", next.display());

            let mut files = Vec::with_capacity(self.seed_files.len());
            for seed in &self.seed_files {
                let Some(file_name) = seed.file_name() else {
                    continue;
                };
                let dest = next.join(file_name);
                fs::copy(seed, &dest).with_path("failed to copy file", seed)?;
                files.push(dest);
            }
            let children = self.gen_dirs(&next, breadth - 1, depth - 1)?;
            made.push(CorpusNode {
                path: next,
                files,
                children,
            });
        }
        Ok(made)
    }
}

/// Generate a corpus. Fails if the root exists and `wipe` is not set.
pub fn generate(spec: &CorpusSpec) -> Result<Corpus> {
    if spec.breadth == 0 {
        return Err(HarnessError::EmptyCorpusBudget("breadth"));
    }
    if spec.depth == 0 {
        return Err(HarnessError::EmptyCorpusBudget("depth"));
    }
    let root = std::path::absolute(&spec.root).with_path("cannot resolve directory", &spec.root)?;
    if root.is_dir() {
        if !spec.wipe {
            return Err(HarnessError::CorpusRootExists(root));
        }
        fs::remove_dir_all(&root).with_path("failed to delete directory", &root)?;
    }
    fs::create_dir_all(&root).with_path("failed to create directory", &root)?;

    let mut generator = CorpusGenerator::new(spec.seed, spec.seed_files.clone());
    let top = generator.gen_dirs(&root, spec.breadth, spec.depth)?;
    let corpus = Corpus { root, top };
    tracing::debug!(
        "Made {} directories, {} files",
        corpus.dirs_created(),
        corpus.files_created()
    );
    Ok(corpus)
}

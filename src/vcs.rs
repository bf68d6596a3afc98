//! Version control collaborator
//!
//! World definitions live in the Stack's own repository. Some edits (plugin
//! enable/disable) are committed right after they are saved.

use std::path::Path;

use git2::{Commit, IndexAddOption, Oid, Repository, Signature};
use tracing::{debug, info};

use crate::error::Result;

/// Commits the working tree of the repository a world definition lives in
pub trait VersionControl {
    fn commit(&self, message: &str) -> Result<()>;
}

/// Git repository backed by libgit2
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open the repository containing `path`
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(path.as_ref())?;
        Ok(Self { repo })
    }

    /// Open the repository at `path`, creating it when missing
    pub fn open_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let repo = match Repository::open(path.as_ref()) {
            Ok(repo) => repo,
            Err(_) => Repository::init(path.as_ref())?,
        };
        Ok(Self { repo })
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    /// Stage every change and commit it on HEAD
    ///
    /// Returns `None` when there was nothing to commit.
    pub fn commit_all(&self, message: &str) -> Result<Option<Oid>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_oid = index.write_tree()?;
        let parent = self.head_commit();
        if let Some(parent) = &parent {
            if parent.tree_id() == tree_oid {
                debug!("nothing to commit");
                return Ok(None);
            }
        }
        let tree = self.repo.find_tree(tree_oid)?;

        let sig = self.signature()?;
        let parents: Vec<&Commit> = parent.iter().collect();
        let oid = self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        info!(commit = %oid, "{}", message);
        Ok(Some(oid))
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(Signature::now("worldstack", "worldstack@localhost")?),
        }
    }

    fn head_commit(&self) -> Option<Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }
}

impl VersionControl for GitRepository {
    fn commit(&self, message: &str) -> Result<()> {
        self.commit_all(message)?;
        Ok(())
    }
}

//! Generic slash-delimited path walker over any [`Node`] (spec §4.4), used
//! by the WebDAV adapter, which is the only transport here that delivers a
//! full path instead of a (parent, name) pair — see SPEC_FULL.md §4.6 for
//! why the NFS adapter does not use this.

use crate::error::{VfmError, VfmResult};
use crate::vfm::{Node, Vfm};

/// Walk `root` by applying [`Node::lookup`] for each non-empty,
/// slash-delimited component of `path` in order. A leading slash is
/// optional; empty components (from a leading, trailing, or doubled slash)
/// are ignored.
pub fn resolve(vfm: &Vfm, root: &Node, path: &str) -> VfmResult<Node> {
    let mut current = root.clone();
    let mut walked = String::new();

    for component in path.split('/').filter(|c| !c.is_empty()) {
        match current.lookup(vfm, component) {
            Ok(next) => current = next,
            Err(VfmError::NotSupported(_)) => {
                return Err(VfmError::not_supported(component));
            }
            Err(VfmError::NotFound(_)) => {
                return Err(VfmError::not_found(if walked.is_empty() {
                    component.to_string()
                } else {
                    walked.clone()
                }));
            }
            Err(other) => return Err(other),
        }
        if !walked.is_empty() {
            walked.push('/');
        }
        walked.push_str(component);
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit_index::CommitIndex;
    use crate::fake_repo::single_commit_readme;
    use crate::repo::GitSource;
    use std::sync::Arc;

    fn vfm_over(repo: crate::fake_repo::FakeRepo) -> Vfm {
        let repo: Arc<dyn GitSource> = Arc::new(repo);
        let index = Arc::new(CommitIndex::new(repo.clone()));
        Vfm::new(repo, index, crate::vfm::DEFAULT_MAX_COMMITS)
    }

    #[test]
    fn resolve_matches_chained_lookup() {
        let (repo, commit_id) = single_commit_readme();
        let vfm = vfm_over(repo);
        let id = commit_id.to_string();

        let path = format!("commits/{}/{}/{}/README", &id[..2], &id[..4], id);
        let via_resolver = resolve(&vfm, &Node::Root, &path).unwrap();

        let via_chain = Node::Root
            .lookup(&vfm, "commits")
            .unwrap()
            .lookup(&vfm, &id[..2])
            .unwrap()
            .lookup(&vfm, &id[..4])
            .unwrap()
            .lookup(&vfm, &id)
            .unwrap()
            .lookup(&vfm, "README")
            .unwrap();

        assert_eq!(via_resolver.read_all(&vfm).unwrap(), via_chain.read_all(&vfm).unwrap());
    }

    #[test]
    fn resolve_ignores_leading_and_doubled_slashes() {
        let vfm = vfm_over(crate::fake_repo::FakeRepo::new());
        let node = resolve(&vfm, &Node::Root, "//commits//").unwrap();
        assert!(matches!(node, Node::CommitsRoot));
    }

    #[test]
    fn resolve_fails_not_found_on_missing_component() {
        let vfm = vfm_over(crate::fake_repo::FakeRepo::new());
        let err = resolve(&vfm, &Node::Root, "nope").unwrap_err();
        assert!(matches!(err, VfmError::NotFound(_)));
    }

    #[test]
    fn resolve_fails_not_supported_past_a_leaf_node() {
        let (repo, commit_id) = single_commit_readme();
        let vfm = vfm_over(repo);
        let id = commit_id.to_string();
        let path = format!("commits/{}/{}/{}/README/extra", &id[..2], &id[..4], id);
        let err = resolve(&vfm, &Node::Root, &path).unwrap_err();
        assert!(matches!(err, VfmError::NotSupported(_)));
    }
}

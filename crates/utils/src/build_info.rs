/// Git metadata captured by the build script.
pub(crate) struct BuildInfo {
    pub commit_sha1: Option<&'static str>,
    git_dirty: Option<&'static str>,
}

impl BuildInfo {
    /// Whether the tree had uncommitted changes when built.
    pub fn git_dirty(&self) -> bool {
        is_dirty(self.git_dirty)
    }
}

fn is_dirty(flag: Option<&str>) -> bool {
    flag.is_some_and(|flag| flag.trim() == "true")
}

pub(crate) const BUILD_INFO: BuildInfo = BuildInfo {
    commit_sha1: option_env!("VERGEN_GIT_SHA"),
    git_dirty: option_env!("VERGEN_GIT_DIRTY"),
};

use std::path::{Path, PathBuf};

/// Logical layout of the analysis output directory.
///
/// This is derived from the output root. It does *not* perform any IO itself;
/// the pipeline creates directories and files based on it.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// Output root directory.
    pub root: PathBuf,
    /// Build-wide listing of global functions.
    pub global_list_path: PathBuf,
}

impl OutputLayout {
    /// Compute the layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let global_list_path = root.join("global_funclist.txt");
        Self { root, global_list_path }
    }

    /// Per-driver output directory.
    pub fn driver_dir(&self, driver: &str) -> PathBuf {
        self.root.join(driver)
    }

    pub fn entry_list_path(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join("entry_list.txt")
    }

    pub fn call_tree_path(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join(format!("{driver}_call_tree.txt"))
    }

    pub fn func_list_path(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join(format!("{driver}_func_list.txt"))
    }

    /// Marker written once a driver has been fully analyzed.
    pub fn done_marker_path(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join("done.json")
    }
}

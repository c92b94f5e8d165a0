use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::KiraError;

/// Services the surrounding pipeline provides to the planner.
pub trait StepHost {
    /// Output directory for one sample (or the project title).
    fn make_folder_for_sample(&mut self, title: &str) -> Result<Utf8PathBuf, KiraError>;

    /// Directory the next command writes into. May differ from `base_dir`
    /// when a local scratch area is used.
    fn local_start(&mut self, base_dir: &Utf8Path) -> Result<Utf8PathBuf, KiraError>;

    /// Closes a directory opened by [`StepHost::local_start`]. Returns shell
    /// text to append to the command block, if any.
    fn local_finish(&mut self, use_dir: &Utf8Path, base_dir: &Utf8Path) -> Option<String>;

    /// Registers a newly produced file for downstream dependency tracking.
    fn stamp_file(&mut self, path: &Utf8Path);
}

/// Scoped working directory. Dropping it without [`LocalDir::finish`]
/// still closes it on the host.
pub struct LocalDir<'h, H: StepHost + ?Sized> {
    host: &'h mut H,
    use_dir: Utf8PathBuf,
    base_dir: Utf8PathBuf,
    open: bool,
}

impl<'h, H: StepHost + ?Sized> LocalDir<'h, H> {
    pub fn start(host: &'h mut H, base_dir: &Utf8Path) -> Result<Self, KiraError> {
        let use_dir = host.local_start(base_dir)?;
        Ok(Self {
            host,
            use_dir,
            base_dir: base_dir.to_path_buf(),
            open: true,
        })
    }

    pub fn use_dir(&self) -> &Utf8Path {
        &self.use_dir
    }

    pub fn finish(mut self) -> Option<String> {
        self.open = false;
        self.host.local_finish(&self.use_dir, &self.base_dir)
    }
}

impl<H: StepHost + ?Sized> Drop for LocalDir<'_, H> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.host.local_finish(&self.use_dir, &self.base_dir);
        }
    }
}

/// Host used by the command line tool. Records stamps and, unless running
/// dry, creates the output directories.
#[derive(Debug, Clone)]
pub struct ScriptHost {
    local_dir: Option<Utf8PathBuf>,
    sample_dirs: bool,
    create_dirs: bool,
    stamped: Vec<Utf8PathBuf>,
    open_scopes: usize,
    base_dir: Utf8PathBuf,
}

impl ScriptHost {
    pub fn new(base_dir: Utf8PathBuf) -> Self {
        Self {
            local_dir: None,
            sample_dirs: false,
            create_dirs: false,
            stamped: Vec::new(),
            open_scopes: 0,
            base_dir,
        }
    }

    pub fn with_local_dir(mut self, local_dir: Option<Utf8PathBuf>) -> Self {
        self.local_dir = local_dir;
        self
    }

    pub fn with_sample_dirs(mut self, sample_dirs: bool) -> Self {
        self.sample_dirs = sample_dirs;
        self
    }

    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn stamped(&self) -> &[Utf8PathBuf] {
        &self.stamped
    }

    pub fn open_scopes(&self) -> usize {
        self.open_scopes
    }

    fn ensure_dir(&self, dir: &Utf8Path) -> Result<(), KiraError> {
        if self.create_dirs {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| KiraError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }
}

impl StepHost for ScriptHost {
    fn make_folder_for_sample(&mut self, title: &str) -> Result<Utf8PathBuf, KiraError> {
        let dir = if self.sample_dirs {
            self.base_dir.join(title)
        } else {
            self.base_dir.clone()
        };
        self.ensure_dir(&dir)?;
        Ok(dir)
    }

    fn local_start(&mut self, base_dir: &Utf8Path) -> Result<Utf8PathBuf, KiraError> {
        let use_dir = match &self.local_dir {
            Some(local) => local.join(base_dir.strip_prefix("/").unwrap_or(base_dir)),
            None => base_dir.to_path_buf(),
        };
        self.ensure_dir(&use_dir)?;
        self.open_scopes += 1;
        Ok(use_dir)
    }

    fn local_finish(&mut self, use_dir: &Utf8Path, base_dir: &Utf8Path) -> Option<String> {
        self.open_scopes = self.open_scopes.saturating_sub(1);
        if use_dir == base_dir {
            return None;
        }
        debug!(%use_dir, %base_dir, "moving local outputs");
        Some(format!("mkdir -p {base_dir}\nmv {use_dir}/* {base_dir}/\n"))
    }

    fn stamp_file(&mut self, path: &Utf8Path) {
        self.stamped.push(path.to_path_buf());
    }
}

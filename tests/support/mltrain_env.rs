use std::{
    ffi::OsString,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use mltrain::app_dirs::CONFIG_HOME_ENV;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Points `MLTRAIN_CONFIG_HOME` somewhere else until dropped.
///
/// Every guard holds `ENV_LOCK` for its whole life, so no two tests in this
/// binary touch the process environment at once. That lock is what makes
/// the `set_var` and `remove_var` calls below sound.
pub struct MltrainEnvGuard {
    previous: Option<OsString>,
    _serial: MutexGuard<'static, ()>,
}

impl MltrainEnvGuard {
    pub fn set_config_home(path: PathBuf) -> Self {
        let serial = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
        let previous = std::env::var_os(CONFIG_HOME_ENV);
        write_config_home(Some(path.into_os_string()));
        Self {
            previous,
            _serial: serial,
        }
    }
}

impl Drop for MltrainEnvGuard {
    fn drop(&mut self) {
        write_config_home(self.previous.take());
    }
}

fn write_config_home(value: Option<OsString>) {
    // SAFETY: only called while the caller holds ENV_LOCK.
    unsafe {
        match value {
            Some(value) => std::env::set_var(CONFIG_HOME_ENV, value),
            None => std::env::remove_var(CONFIG_HOME_ENV),
        }
    }
}

use crate::error::PipelineError;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Flag shared by the handles of a training pipeline; set while a run is in progress.
#[derive(Debug, Clone, Default)]
pub struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    /// Constructs a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a run holds the flag.
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sets the flag, or fails with [`PipelineError::AlreadyRunning`] if it is set.
    ///
    /// The flag is cleared when the returned guard is dropped.
    pub fn try_acquire(&self) -> Result<RunGuard, PipelineError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::AlreadyRunning)?;
        Ok(RunGuard {
            flag: self.0.clone(),
        })
    }
}

/// Clears the [`RunningFlag`] on drop.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let flag = RunningFlag::new();
        let guard = flag.try_acquire().unwrap();
        assert!(flag.is_running());
        assert!(matches!(
            flag.clone().try_acquire(),
            Err(PipelineError::AlreadyRunning)
        ));
        drop(guard);
        assert!(!flag.is_running());
        assert!(flag.try_acquire().is_ok());
    }

    #[test]
    fn released_on_panic() {
        let flag = RunningFlag::new();
        let f = flag.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = f.try_acquire().unwrap();
            panic!("stage panicked");
        });
        assert!(result.is_err());
        assert!(!flag.is_running());
    }
}

/// Per-session flags tracked by each endpoint.
///
/// A session runs from INIT to DONE; both reset the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    download_started: bool,
    first_fragment: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            download_started: false,
            first_fragment: true,
        }
    }
}

impl Session {
    /// Whether a WRITE has been issued since the last reset.
    pub fn download_started(&self) -> bool {
        self.download_started
    }

    /// Whether the next WRITE is the first of the session.
    pub fn first_fragment(&self) -> bool {
        self.first_fragment
    }

    pub fn mark_download_started(&mut self) {
        self.download_started = true;
    }

    /// Consume the first-fragment flag, returning its previous value.
    pub fn take_first_fragment(&mut self) -> bool {
        std::mem::replace(&mut self.first_fragment, false)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fragment_is_taken_once() {
        let mut session = Session::default();
        assert!(session.take_first_fragment());
        assert!(!session.take_first_fragment());
        session.reset();
        assert!(session.first_fragment());
    }

    #[test]
    fn reset_clears_download_started() {
        let mut session = Session::default();
        session.mark_download_started();
        assert!(session.download_started());
        session.reset();
        assert!(!session.download_started());
    }
}

//! Signal System
//!
//! The signal catalog: POSIX numbering, and what happens when a process
//! receives a signal it has no handler for.
//!
//! | Signal   | Number | Default   |
//! |----------|--------|-----------|
//! | SIGHUP   | 1      | terminate |
//! | SIGINT   | 2      | terminate |
//! | SIGQUIT  | 3      | terminate |
//! | SIGILL   | 4      | terminate |
//! | SIGABRT  | 6      | terminate |
//! | SIGFPE   | 8      | terminate |
//! | SIGKILL  | 9      | terminate (cannot be caught) |
//! | SIGUSR1  | 10     | terminate |
//! | SIGSEGV  | 11     | terminate |
//! | SIGUSR2  | 12     | terminate |
//! | SIGPIPE  | 13     | terminate |
//! | SIGALRM  | 14     | terminate |
//! | SIGTERM  | 15     | terminate |
//! | SIGCHLD  | 17     | ignore    |
//! | SIGCONT  | 18     | continue  |
//! | SIGSTOP  | 19     | stop (cannot be caught) |
//! | SIGTSTP  | 20     | stop      |
//! | SIGTTIN  | 21     | stop      |
//! | SIGTTOU  | 22     | stop      |
//! | SIGWINCH | 28     | ignore    |
//!
//! A process terminated by a signal exits with `128 + number`.

/// Signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Signal {
    /// Hangup
    SIGHUP = 1,
    /// Interrupt (Ctrl+C)
    SIGINT = 2,
    /// Quit
    SIGQUIT = 3,
    /// Illegal instruction
    SIGILL = 4,
    /// Abort
    SIGABRT = 6,
    /// Arithmetic error
    SIGFPE = 8,
    /// Kill process (cannot be caught)
    SIGKILL = 9,
    /// User-defined signal 1
    SIGUSR1 = 10,
    /// Invalid memory reference
    SIGSEGV = 11,
    /// User-defined signal 2
    SIGUSR2 = 12,
    /// Broken pipe
    SIGPIPE = 13,
    /// Alarm timer expired
    SIGALRM = 14,
    /// Terminate process (can be caught)
    SIGTERM = 15,
    /// Child process terminated
    SIGCHLD = 17,
    /// Continue stopped process
    SIGCONT = 18,
    /// Stop process (cannot be caught)
    SIGSTOP = 19,
    /// Stop from the terminal (Ctrl+Z)
    SIGTSTP = 20,
    /// Background read from the terminal
    SIGTTIN = 21,
    /// Background write to the terminal
    SIGTTOU = 22,
    /// Terminal window resized
    SIGWINCH = 28,
}

/// What happens to a process that receives a signal without a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    /// Become a zombie with exit code `128 + number`
    Terminate,
    Ignore,
    Stop,
    Continue,
}

impl Signal {
    pub const ALL: [Signal; 20] = [
        Signal::SIGHUP,
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGILL,
        Signal::SIGABRT,
        Signal::SIGFPE,
        Signal::SIGKILL,
        Signal::SIGUSR1,
        Signal::SIGSEGV,
        Signal::SIGUSR2,
        Signal::SIGPIPE,
        Signal::SIGALRM,
        Signal::SIGTERM,
        Signal::SIGCHLD,
        Signal::SIGCONT,
        Signal::SIGSTOP,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGWINCH,
    ];

    /// Get signal from number
    pub fn from_num(n: u8) -> Option<Signal> {
        Self::ALL.into_iter().find(|s| s.num() == n)
    }

    /// Get signal from name, with or without the `SIG` prefix, any case
    pub fn from_name(name: &str) -> Option<Signal> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        Self::ALL.into_iter().find(|s| &s.name()[3..] == bare)
    }

    /// Get signal number
    pub fn num(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "SIGHUP",
            Signal::SIGINT => "SIGINT",
            Signal::SIGQUIT => "SIGQUIT",
            Signal::SIGILL => "SIGILL",
            Signal::SIGABRT => "SIGABRT",
            Signal::SIGFPE => "SIGFPE",
            Signal::SIGKILL => "SIGKILL",
            Signal::SIGUSR1 => "SIGUSR1",
            Signal::SIGSEGV => "SIGSEGV",
            Signal::SIGUSR2 => "SIGUSR2",
            Signal::SIGPIPE => "SIGPIPE",
            Signal::SIGALRM => "SIGALRM",
            Signal::SIGTERM => "SIGTERM",
            Signal::SIGCHLD => "SIGCHLD",
            Signal::SIGCONT => "SIGCONT",
            Signal::SIGSTOP => "SIGSTOP",
            Signal::SIGTSTP => "SIGTSTP",
            Signal::SIGTTIN => "SIGTTIN",
            Signal::SIGTTOU => "SIGTTOU",
            Signal::SIGWINCH => "SIGWINCH",
        }
    }

    /// Exit code of a process terminated by this signal
    pub fn exit_code(&self) -> i32 {
        128 + i32::from(self.num())
    }

    /// Check if a handler may be registered
    pub fn can_catch(&self) -> bool {
        !matches!(self, Signal::SIGKILL | Signal::SIGSTOP)
    }

    /// Get default action for this signal
    pub fn default_action(&self) -> DefaultAction {
        match self {
            Signal::SIGCHLD | Signal::SIGWINCH => DefaultAction::Ignore,
            Signal::SIGCONT => DefaultAction::Continue,
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                DefaultAction::Stop
            }
            _ => DefaultAction::Terminate,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_numbers() {
        assert_eq!(Signal::SIGHUP.num(), 1);
        assert_eq!(Signal::SIGINT.num(), 2);
        assert_eq!(Signal::SIGKILL.num(), 9);
        assert_eq!(Signal::SIGTERM.num(), 15);
        assert_eq!(Signal::SIGSTOP.num(), 19);
        assert_eq!(Signal::SIGWINCH.num(), 28);
    }

    #[test]
    fn test_signal_from_num() {
        for signal in Signal::ALL {
            assert_eq!(Signal::from_num(signal.num()), Some(signal));
        }
        assert_eq!(Signal::from_num(0), None);
        assert_eq!(Signal::from_num(5), None);
        assert_eq!(Signal::from_num(99), None);
    }

    #[test]
    fn test_signal_from_name() {
        assert_eq!(Signal::from_name("SIGINT"), Some(Signal::SIGINT));
        assert_eq!(Signal::from_name("int"), Some(Signal::SIGINT));
        assert_eq!(Signal::from_name("sigwinch"), Some(Signal::SIGWINCH));
        assert_eq!(Signal::from_name("SIG"), None);
        assert_eq!(Signal::from_name("BOGUS"), None);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Signal::SIGINT.exit_code(), 130);
        assert_eq!(Signal::SIGKILL.exit_code(), 137);
        assert_eq!(Signal::SIGALRM.exit_code(), 142);
        assert_eq!(Signal::SIGTERM.exit_code(), 143);
    }

    #[test]
    fn test_can_catch() {
        assert!(!Signal::SIGKILL.can_catch());
        assert!(!Signal::SIGSTOP.can_catch());
        assert!(Signal::SIGTSTP.can_catch());
        assert!(Signal::SIGCONT.can_catch());
        assert!(Signal::SIGTERM.can_catch());
    }

    #[test]
    fn test_default_actions() {
        assert_eq!(Signal::SIGTERM.default_action(), DefaultAction::Terminate);
        assert_eq!(Signal::SIGUSR1.default_action(), DefaultAction::Terminate);
        assert_eq!(Signal::SIGCHLD.default_action(), DefaultAction::Ignore);
        assert_eq!(Signal::SIGWINCH.default_action(), DefaultAction::Ignore);
        assert_eq!(Signal::SIGCONT.default_action(), DefaultAction::Continue);
        assert_eq!(Signal::SIGTTOU.default_action(), DefaultAction::Stop);
    }

    #[test]
    fn test_display() {
        assert_eq!(Signal::SIGALRM.to_string(), "SIGALRM");
    }
}

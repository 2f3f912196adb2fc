//! System call boundary of the task layer
//!
//! User code traps with the syscall number in RAX and arguments in
//! RDI/RSI/RDX; the result goes back in RAX. Negative results are errno
//! values.

pub mod dispatcher;
pub mod errno;

pub use dispatcher::dispatch_syscall;

/// System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    GetTicks = 4,
    Fork = 5,
    Sleep = 35,
    GetPid = 39,
    Kill = 62,
    GetCid = 309, // Linux getcpu
    GetNumFreePage = 500,
    GetNumUsedPage = 501,
}

impl SyscallNumber {
    /// Try to convert a u64 to a SyscallNumber
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            4 => Some(Self::GetTicks),
            5 => Some(Self::Fork),
            35 => Some(Self::Sleep),
            39 => Some(Self::GetPid),
            62 => Some(Self::Kill),
            309 => Some(Self::GetCid),
            500 => Some(Self::GetNumFreePage),
            501 => Some(Self::GetNumUsedPage),
            _ => None,
        }
    }
}

/// System call result type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    Ok(u64),
    /// Positive errno
    Err(i32),
}

impl SyscallResult {
    /// Value placed in the return register.
    pub fn to_return_value(self) -> u64 {
        match self {
            SyscallResult::Ok(value) => value,
            SyscallResult::Err(errno) => (-(errno as i64)) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_round_trip() {
        for number in [
            SyscallNumber::GetTicks,
            SyscallNumber::Fork,
            SyscallNumber::Sleep,
            SyscallNumber::GetPid,
            SyscallNumber::Kill,
            SyscallNumber::GetCid,
            SyscallNumber::GetNumFreePage,
            SyscallNumber::GetNumUsedPage,
        ] {
            assert_eq!(SyscallNumber::from_u64(number as u64), Some(number));
        }
        assert_eq!(SyscallNumber::from_u64(1), None);
    }

    #[test]
    fn test_errors_are_negative() {
        assert_eq!(SyscallResult::Err(errno::EAGAIN).to_return_value() as i64, -11);
        assert_eq!(SyscallResult::Ok(7).to_return_value(), 7);
    }
}

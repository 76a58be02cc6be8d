use bitflags::bitflags;

bitflags! {
    /// Open flags understood by the driver, using the POSIX bit layout
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRITE_ONLY = 0o1;
        const READ_WRITE = 0o2;
        const CREATE = 0o100;
        const EXCLUSIVE = 0o200;
        const TRUNCATE = 0o1000;
        const APPEND = 0o2000;
    }
}

impl OpenFlags {
    /// O_RDONLY is the absence of both access bits
    pub const READ_ONLY: OpenFlags = OpenFlags::empty();

    pub fn is_read_only(&self) -> bool {
        !self.intersects(Self::WRITE_ONLY | Self::READ_WRITE | Self::APPEND | Self::TRUNCATE)
    }

    pub fn can_read(&self) -> bool {
        !self.contains(Self::WRITE_ONLY)
    }

    pub fn can_write(&self) -> bool {
        !self.is_read_only()
    }

    /// Flag names for log lines
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "O_RDONLY".to_string();
        }
        self.iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::READ_ONLY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_modes() {
        assert!(OpenFlags::READ_ONLY.is_read_only());
        assert!(OpenFlags::READ_ONLY.can_read());

        let wo = OpenFlags::WRITE_ONLY | OpenFlags::CREATE;
        assert!(wo.can_write());
        assert!(!wo.can_read());

        assert!(OpenFlags::APPEND.can_write());
        assert!(OpenFlags::READ_WRITE.can_read());
    }

    #[test]
    fn test_describe() {
        assert_eq!(OpenFlags::READ_ONLY.describe(), "O_RDONLY");
        assert_eq!(
            (OpenFlags::WRITE_ONLY | OpenFlags::CREATE).describe(),
            "WRITE_ONLY|CREATE"
        );
    }
}

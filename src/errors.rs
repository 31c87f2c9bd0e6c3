use thiserror::Error;

/// Errors surfaced by the fallible (`try_*`) constructors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PtrError {
    #[error("failed to allocate {size} bytes (align {align}) for `{type_name}`")]
    AllocationFailed {
        type_name: &'static str,
        size: usize,
        align: usize,
    },
}

impl PtrError {
    pub(crate) fn allocation_failed<T>() -> Self {
        let layout = std::alloc::Layout::new::<T>();
        PtrError::AllocationFailed {
            type_name: std::any::type_name::<T>(),
            size: layout.size(),
            align: layout.align(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PtrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_failed_describes_the_layout() {
        let e = PtrError::allocation_failed::<u64>();
        assert_eq!(
            e,
            PtrError::AllocationFailed {
                type_name: "u64",
                size: 8,
                align: 8,
            }
        );
        assert_eq!(
            e.to_string(),
            "failed to allocate 8 bytes (align 8) for `u64`"
        );
    }
}

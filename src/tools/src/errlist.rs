use std::fmt::{Display, Formatter};

use crate::error::{ImportError, Result};

/// ErrorList accumulates the errors of a multi-step operation, e.g. writing a
/// shard and then closing it, so that a failure in one step does not hide another.
#[derive(Debug, Default)]
pub struct ErrorList {
    errs: Vec<ImportError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, err: ImportError) {
        self.errs.push(err);
    }

    /// add_result records the error side of `result`; `Ok` is ignored.
    pub fn add_result<T>(&mut self, result: Result<T>) {
        if let Err(e) = result {
            self.errs.push(e);
        }
    }

    pub fn len(&self) -> usize {
        self.errs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errs.is_empty()
    }

    /// err returns `Ok` if nothing was added, the error itself if exactly one
    /// was added, and the whole list otherwise.
    pub fn err(mut self) -> Result<()> {
        match self.errs.len() {
            0 => Ok(()),
            1 => match self.errs.pop() {
                Some(e) => Err(e),
                None => Ok(()),
            },
            _ => Err(ImportError::Multiple(self)),
        }
    }
}

impl Display for ErrorList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, e) in self.errs.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", e)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use crate::errlist::ErrorList;
    use crate::error::ImportError;

    #[test]
    fn test_errlist_empty() {
        let mut errs = ErrorList::new();
        errs.add_result(Ok(()));
        errs.add_result(Ok(1));
        assert!(errs.is_empty());
        assert!(errs.err().is_ok());
    }

    #[test]
    fn test_errlist_single() {
        let mut errs = ErrorList::new();
        errs.add_result(Ok(()));
        errs.add(ImportError::format("bad frame"));

        match errs.err() {
            Err(ImportError::Format(msg)) => assert_eq!(msg, "bad frame"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_errlist_multiple() {
        let mut errs = ErrorList::new();
        errs.add(ImportError::Write(anyhow!("field type conflict")));
        errs.add_result::<()>(Err(ImportError::Store(anyhow!("disk full"))));
        assert_eq!(errs.len(), 2);

        let err = errs.err().unwrap_err();
        assert!(matches!(err, ImportError::Multiple(_)));
        assert_eq!(
            err.to_string(),
            "[write error: field type conflict,store error: disk full]"
        );
    }
}

//! Interactive proxy counts for manual distribution

use crate::logger;
use crate::proxy::{AllocationSource, Rejection};
use std::io::{self, BufRead, Write};

/// Asks the operator for each account's proxy count, one line per answer
pub struct LineAllocation<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineAllocation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                logger::error(format!("Failed to read input: {}", e));
                None
            }
        }
    }
}

/// Allocation source reading from the terminal
pub type StdinAllocation = LineAllocation<io::StdinLock<'static>, io::Stdout>;

impl StdinAllocation {
    pub fn stdin() -> Self {
        LineAllocation::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> AllocationSource for LineAllocation<R, W> {
    fn request(&mut self, index: usize, total: usize, available: usize) -> Option<usize> {
        loop {
            let _ = write!(
                self.output,
                "Number of proxies for token {} (max {}, {} left): ",
                index + 1,
                total,
                available
            );
            let _ = self.output.flush();

            let answer = self.read_line()?;
            match answer.parse::<usize>() {
                Ok(count) => return Some(count),
                Err(_) => logger::error("Invalid number, please try again"),
            }
        }
    }

    fn rejected(&mut self, index: usize, reason: Rejection) {
        tracing::debug!(token = index + 1, %reason, "allocation rejected, asking again");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Credential;
    use crate::proxy::{DistributionMode, ProxyEndpoint, ProxyPool, ProxyScheme};
    use std::io::Cursor;

    #[test]
    fn test_skips_non_numeric_answers() {
        let mut source = LineAllocation::new(Cursor::new("abc\n\n4\n"), Vec::new());
        assert_eq!(source.request(0, 9, 9), Some(4));

        let prompts = String::from_utf8(source.output).unwrap();
        assert_eq!(prompts.matches("token 1").count(), 3);
    }

    #[test]
    fn test_end_of_input() {
        let mut source = LineAllocation::new(Cursor::new(""), Vec::new());
        assert_eq!(source.request(0, 3, 3), None);
    }

    #[test]
    fn test_drives_manual_partition() {
        let accounts: Vec<Credential> = (0..3)
            .map(|i| Credential::new(format!("token-{}", i)).unwrap())
            .collect();
        let proxies = (0..9)
            .map(|i| ProxyEndpoint::new(ProxyScheme::Http, format!("10.0.0.{}", i + 1), 8080))
            .collect();
        let mut source = LineAllocation::new(Cursor::new("2\n7\n0\n"), Vec::new());

        let err = ProxyPool::partition(&accounts, proxies, DistributionMode::Manual, &mut source)
            .unwrap_err();
        assert!(err.to_string().contains("token 3"));
    }
}

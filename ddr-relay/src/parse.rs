pub mod osu;

use anyhow::{anyhow, Context, Result};

/// Field reader over a split record.
pub(crate) trait Take<'a> {
    fn take_str(&mut self) -> Result<&'a str>;
    fn take_i32(&mut self) -> Result<i32>;
    fn take_i64(&mut self) -> Result<i64>;
    fn take_u32(&mut self) -> Result<u32>;
}

impl<'a, T: Iterator<Item = &'a str>> Take<'a> for T {
    fn take_str(&mut self) -> Result<&'a str> {
        self.next()
            .map(str::trim)
            .ok_or_else(|| anyhow!("unexpected eol"))
    }

    fn take_i32(&mut self) -> Result<i32> {
        self.take_str()
            .and_then(|it| it.parse::<i32>().map_err(|e| anyhow!(e)))
            .context("expected i32")
    }

    fn take_i64(&mut self) -> Result<i64> {
        self.take_str()
            .and_then(|it| it.parse::<i64>().map_err(|e| anyhow!(e)))
            .context("expected i64")
    }

    fn take_u32(&mut self) -> Result<u32> {
        self.take_str()
            .and_then(|it| it.parse::<u32>().map_err(|e| anyhow!(e)))
            .context("expected u32")
    }
}

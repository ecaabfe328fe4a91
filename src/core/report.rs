//! 同步进度报告
//!
//! 所有计数在同一把锁下修改，每次修改后重绘一行状态。

use crate::error::{Result, SyncError};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// 报告阶段，只能向前推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportState {
    /// 统计本地文件
    Local,
    /// 比较文件
    Compare,
    /// 等待传输完成
    Transfer,
    Done,
}

impl ReportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportState::Local => "local",
            ReportState::Compare => "compare",
            ReportState::Transfer => "transfer",
            ReportState::Done => "done",
        }
    }
}

/// 计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub local_file_count: u64,
    pub compare_count: u64,
    pub total_transfer_files: u64,
    pub total_transfer_bytes: u64,
    pub transfer_files: u64,
    pub transfer_bytes: u64,
}

struct ReportInner {
    state: ReportState,
    counts: ReportCounts,
    /// 上一次输出的状态行，用于覆盖
    current_line: String,
    out: Box<dyn Write + Send>,
}

/// 同步进度报告器，可在多个任务间共享
pub struct SyncReport {
    start_time: Instant,
    inner: Mutex<ReportInner>,
}

impl SyncReport {
    /// 输出到标准输出
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            start_time: Instant::now(),
            inner: Mutex::new(ReportInner {
                state: ReportState::Local,
                counts: ReportCounts::default(),
                current_line: String::new(),
                out,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ReportState {
        self.lock().state
    }

    pub fn counts(&self) -> ReportCounts {
        self.lock().counts
    }

    fn expect_state(
        inner: &ReportInner,
        expected: ReportState,
        operation: &'static str,
    ) -> Result<()> {
        if inner.state == expected {
            Ok(())
        } else {
            Err(SyncError::InvalidReportState {
                operation,
                state: inner.state.as_str(),
            })
        }
    }

    /// 本地文件计数增加
    pub fn update_local(&self, delta: u64) -> Result<()> {
        let mut inner = self.lock();
        Self::expect_state(&inner, ReportState::Local, "update_local")?;
        inner.counts.local_file_count += delta;
        self.update_progress(&mut inner);
        Ok(())
    }

    /// 本地统计结束，进入比较阶段
    pub fn end_local(&self) -> Result<()> {
        let mut inner = self.lock();
        Self::expect_state(&inner, ReportState::Local, "end_local")?;
        inner.state = ReportState::Compare;
        self.update_progress(&mut inner);
        Ok(())
    }

    pub fn update_compare(&self, delta: u64) {
        let mut inner = self.lock();
        inner.counts.compare_count += delta;
        self.update_progress(&mut inner);
    }

    /// 比较结束，记录需要传输的总量并进入传输阶段
    pub fn end_compare(&self, total_transfer_files: u64, total_transfer_bytes: u64) -> Result<()> {
        let mut inner = self.lock();
        Self::expect_state(&inner, ReportState::Compare, "end_compare")?;
        inner.state = ReportState::Transfer;
        inner.counts.total_transfer_files = total_transfer_files;
        inner.counts.total_transfer_bytes = total_transfer_bytes;
        self.update_progress(&mut inner);
        Ok(())
    }

    pub fn update_transfer(&self, file_delta: u64, byte_delta: u64) {
        let mut inner = self.lock();
        inner.counts.transfer_files += file_delta;
        inner.counts.transfer_bytes += byte_delta;
        self.update_progress(&mut inner);
    }

    /// 输出一整行（例如完成的动作），然后重绘状态行
    pub fn print_completion(&self, message: &str) {
        let mut inner = self.lock();
        Self::print_line(&mut inner, message, true);
        self.update_progress(&mut inner);
    }

    /// 清除状态行并结束
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.state != ReportState::Done {
            Self::print_line(&mut inner, "", true);
        }
        inner.state = ReportState::Done;
    }

    fn render(&self, inner: &ReportInner) -> String {
        let c = &inner.counts;
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            (c.transfer_bytes as f64 / elapsed) as u64
        } else {
            0
        };

        match inner.state {
            ReportState::Local => format!(
                " count: {} files   compare: {} files   transferred: {} files   {} bytes   {} B/s",
                c.local_file_count, c.compare_count, c.transfer_files, c.transfer_bytes, rate
            ),
            ReportState::Compare => format!(
                " compare: {}/{} files   transferred: {} files   {} bytes   {} B/s",
                c.compare_count, c.local_file_count, c.transfer_files, c.transfer_bytes, rate
            ),
            ReportState::Transfer => format!(
                " compare: {}/{} files   transferred: {}/{} files   {}/{} bytes   {} B/s",
                c.compare_count,
                c.local_file_count,
                c.transfer_files,
                c.total_transfer_files,
                c.transfer_bytes,
                c.total_transfer_bytes,
                rate
            ),
            ReportState::Done => String::new(),
        }
    }

    fn update_progress(&self, inner: &mut ReportInner) {
        if inner.state == ReportState::Done {
            return;
        }
        let line = self.render(inner);
        Self::print_line(inner, &line, false);
    }

    /// 写一行，用空格盖住上一行多出的字符；状态行以 `\r` 结尾以便下次覆盖
    fn print_line(inner: &mut ReportInner, line: &str, newline: bool) {
        let width = line.chars().count();
        let previous = inner.current_line.chars().count();
        let padding = " ".repeat(previous.saturating_sub(width));
        let end = if newline { "\n" } else { "\r" };

        // 进度输出失败不影响同步本身
        let _ = write!(inner.out, "{}{}{}", line, padding, end);
        let _ = inner.out.flush();

        inner.current_line = if newline {
            String::new()
        } else {
            line.to_string()
        };
    }
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}

//! 单章图片下载进度条。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub(crate) struct ChapterProgress {
    bar: Option<ProgressBar>,
}

impl ChapterProgress {
    /// `enabled == false` 或 `total == 0` 时不画任何东西。
    pub(crate) fn new(enabled: bool, label: &str, total: usize) -> Self {
        if !enabled || total == 0 {
            return Self { bar: None };
        }
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        Self { bar: Some(bar) }
    }

    pub(crate) fn inc(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> Option<u64> {
        self.bar.as_ref().map(|b| b.position())
    }

    pub(crate) fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

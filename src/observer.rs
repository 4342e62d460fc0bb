//! 後処理の途中経過を受け取るフック

use log::debug;

use crate::detection_result::{Candidate, Detection};

/// 後処理の途中経過を受け取るオブザーバ
///
/// 何も上書きしなければ何もしません。`rayon` 機能ではスケールごとに
/// 別スレッドから呼ばれるため `Sync` を要求します。
pub trait DetectionObserver: Sync {
    /// 閾値を超えた候補がデコードされたとき
    fn on_candidate(&self, _scale: usize, _candidate: &Candidate) {}

    /// 1スケールのデコードが終わったとき
    fn on_scale_decoded(&self, _scale: usize, _count: usize) {}

    /// NMS 後の最終結果
    fn on_detections(&self, _detections: &[Detection]) {}
}

/// 何もしないオブザーバ
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DetectionObserver for NoopObserver {}

/// `log` の debug レベルへ出力するオブザーバ
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl DetectionObserver for LogObserver {
    fn on_candidate(&self, scale: usize, candidate: &Candidate) {
        debug!("scale {}: candidate {}", scale, candidate);
    }

    fn on_scale_decoded(&self, scale: usize, count: usize) {
        debug!("scale {}: {} candidates above threshold", scale, count);
    }

    fn on_detections(&self, detections: &[Detection]) {
        debug!("{} detections after nms", detections.len());
    }
}

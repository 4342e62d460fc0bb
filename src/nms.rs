//! Non-Maximum Suppression (NMS)

use crate::config::SuppressionMode;
use crate::detection_result::{Candidate, Detection};
use crate::geometry::iou;

/// スコアの降順に安定ソートします。同点の場合はデコード順を保ちます。
fn sort_by_score(bb: &[Candidate]) -> Vec<Candidate> {
    let mut sorted_bb = bb.to_vec();
    sorted_bb.sort_by(|a, b| b.score.total_cmp(&a.score));
    sorted_bb
}

/// 貪欲法による NMS を適用します。
///
/// 残っている候補のうちスコア最大のものを採用し、それとの IoU が
/// `iou_threshold` を超える候補を取り除く、を `limit` 件に達するまで繰り返します。
///
/// # Args
/// * `candidates` - 全スケールの候補 (デコード順)
/// * `limit` - 出力の最大件数
/// * `iou_threshold` - 抑制の IoU 閾値
/// * `mode` - クラスを区別するかどうか
///
/// # Return
/// * スコアの降順に並んだ検出結果 (`limit` 件以下)
pub fn suppress(
    candidates: &[Candidate],
    limit: usize,
    iou_threshold: f32,
    mode: SuppressionMode,
) -> Vec<Detection> {
    let mut remaining = sort_by_score(candidates);
    let mut kept: Vec<Detection> = Vec::with_capacity(limit.min(remaining.len()));

    while !remaining.is_empty() && kept.len() < limit {
        let best = remaining.remove(0);
        remaining.retain(|c| {
            let comparable = match mode {
                SuppressionMode::CrossClass => true,
                SuppressionMode::PerClass => c.class == best.class,
            };
            !(comparable && iou(&best.rect, &c.rect) > iou_threshold)
        });
        kept.push(best);
    }
    kept
}

/// クラスを区別しない NMS
pub fn nms(candidates: &[Candidate], limit: usize, iou_threshold: f32) -> Vec<Detection> {
    suppress(candidates, limit, iou_threshold, SuppressionMode::CrossClass)
}

//! 1スケール分の特徴マップを候補ボックスへデコードするモジュール

use crate::config::{Anchor, Config};
use crate::detection_result::Candidate;
use crate::error::{PostProcessError, Result};
use crate::geometry::sigmoid;
use crate::tensor::Tensor;

/// `get_cls_id` は、シグモイド後のクラス確率が最大となるクラスを求めます。
///
/// # Args
/// * `tensor` - 特徴マップ
/// * `channel` - クラスロジットの先頭チャネル
/// * `cy`, `cx` - グリッド座標
/// * `num_classes` - クラス数
///
/// # Return
/// * (クラスID, クラス確率)。同値の場合は小さいIDを採用
fn get_cls_id(
    tensor: &Tensor,
    channel: usize,
    cy: usize,
    cx: usize,
    num_classes: usize,
) -> Result<(usize, f32)> {
    let mut best = (0, f32::NEG_INFINITY);
    for c in 0..num_classes {
        let p = sigmoid(tensor.get(channel + c, cy, cx)?);
        if p > best.1 {
            best = (c, p);
        }
    }
    Ok(best)
}

/// 1グリッド・1アンカー分の出力をデコードします。
///
/// # Return
/// * コンフィデンスが閾値を超えた場合のみ候補を返す
fn decode_box(
    tensor: &Tensor,
    cy: usize,
    cx: usize,
    b: usize,
    anchor: Anchor,
    block_size: f32,
    config: &Config,
) -> Result<Option<Candidate>> {
    let channel = b * config.channels_per_box();

    let tx = tensor.get(channel, cy, cx)?;
    let ty = tensor.get(channel + 1, cy, cx)?;
    let tw = tensor.get(channel + 2, cy, cx)?;
    let th = tensor.get(channel + 3, cy, cx)?;
    let tc = tensor.get(channel + 4, cy, cx)?;

    let x = (cx as f32 + sigmoid(tx)) * block_size;
    let y = (cy as f32 + sigmoid(ty)) * block_size;
    let w = tw.exp() * anchor.width;
    let h = th.exp() * anchor.height;

    let objectness = sigmoid(tc);
    let (class, class_score) = get_cls_id(tensor, channel + 5, cy, cx, config.num_classes)?;
    let confidence = objectness * class_score;

    // 閾値ちょうどは採用しない
    if confidence > config.confidence_threshold {
        Ok(Some(Candidate::from_center(x, y, w, h, class, confidence)))
    } else {
        Ok(None)
    }
}

/// テンソルの形状が (チャネル数, グリッド数, グリッド数) と一致するか確認します。
///
/// # Args
/// * `tensor` - 特徴マップ
/// * `scale` - スケールのインデックス (エラー報告用)
/// * `grid_size` - グリッド数
/// * `config` - 設定
pub fn check_shape(tensor: &Tensor, scale: usize, grid_size: usize, config: &Config) -> Result<()> {
    let expected = [config.expected_channels(), grid_size, grid_size];
    if tensor.shape() != expected {
        return Err(PostProcessError::ShapeMismatch {
            scale,
            expected,
            actual: tensor.shape(),
        });
    }
    Ok(())
}

/// `decode_feature_map` は、1スケールの特徴マップから候補ボックスを取り出します。
///
/// 走査順はグリッドの行優先 (`cy` が外側)、その内側でアンカー番号の昇順です。
/// NMS の同点処理はこの順序に依存します。
///
/// # Args
/// * `tensor` - 特徴マップ (channel, row, column)
/// * `scale` - スケールのインデックス (エラー報告用)
/// * `grid_size` - グリッド数
/// * `anchors` - このスケールのアンカーボックス
/// * `config` - 設定
///
/// # Return
/// * コンフィデンスが閾値を超えた候補のベクトル
pub fn decode_feature_map(
    tensor: &Tensor,
    scale: usize,
    grid_size: usize,
    anchors: &[Anchor],
    config: &Config,
) -> Result<Vec<Candidate>> {
    check_shape(tensor, scale, grid_size, config)?;
    if anchors.len() < config.boxes_per_cell {
        return Err(PostProcessError::InvalidConfig(format!(
            "{} anchors for {} boxes per cell",
            anchors.len(),
            config.boxes_per_cell
        )));
    }

    let block_size = config.block_size(grid_size);
    let mut candidates = Vec::new();
    for cy in 0..grid_size {
        for cx in 0..grid_size {
            for (b, &anchor) in anchors.iter().take(config.boxes_per_cell).enumerate() {
                if let Some(c) = decode_box(tensor, cy, cx, b, anchor, block_size, config)? {
                    candidates.push(c);
                }
            }
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorData;

    /// 指定グリッド・アンカーのチャネルへ値を書き込む
    fn set_box(t: &mut TensorData, b: usize, cy: usize, cx: usize, values: &[f32]) {
        let [_, rows, cols] = t.shape;
        for (i, v) in values.iter().enumerate() {
            t.data[(b * 8 + i) * rows * cols + cy * cols + cx] = *v;
        }
    }

    #[test]
    fn zero_tensor_yields_nothing() {
        let config = Config::default();
        let t = TensorData::zeros([24, 13, 13]);
        let anchors = config.anchors.scale(0).unwrap();
        // 全て0なら 0.5 * 0.5 = 0.25
        let out = decode_feature_map(&t.view().unwrap(), 0, 13, anchors, &config).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn single_box_is_placed_at_its_cell() {
        let config = Config::default();
        let mut t = TensorData::zeros([24, 13, 13]);
        // tx=ty=0 -> 中心はセル中央, tw=th=0 -> アンカーそのまま
        set_box(&mut t, 2, 4, 7, &[0., 0., 0., 0., 10., -10., 10., -10.]);
        let anchors = config.anchors.scale(0).unwrap();
        let out = decode_feature_map(&t.view().unwrap(), 0, 13, anchors, &config).unwrap();
        assert_eq!(out.len(), 1);

        let d = out[0];
        assert_eq!(d.class, 1);
        let (cx, cy) = d.rect.center();
        assert!((cx - 7.5 * 32.).abs() < 1e-3);
        assert!((cy - 4.5 * 32.).abs() < 1e-3);
        assert!((d.rect.width - 373.).abs() < 1e-3);
        assert!((d.rect.height - 326.).abs() < 1e-3);
    }

    #[test]
    fn class_ties_pick_the_first_index() {
        let config = Config::default();
        let mut t = TensorData::zeros([24, 13, 13]);
        set_box(&mut t, 0, 0, 0, &[0., 0., 0., 0., 10., 5., 5., 5.]);
        let anchors = config.anchors.scale(0).unwrap();
        let out = decode_feature_map(&t.view().unwrap(), 0, 13, anchors, &config).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class, 0);
    }

    #[test]
    fn order_is_row_major_then_anchor() {
        let config = Config::default();
        let mut t = TensorData::zeros([24, 13, 13]);
        let hit = [0., 0., 0., 0., 10., 10., -10., -10.];
        set_box(&mut t, 1, 2, 0, &hit);
        set_box(&mut t, 0, 2, 0, &hit);
        set_box(&mut t, 2, 0, 5, &hit);
        let anchors = config.anchors.scale(0).unwrap();
        let out = decode_feature_map(&t.view().unwrap(), 0, 13, anchors, &config).unwrap();

        let widths: Vec<f32> = out.iter().map(|d| d.rect.width.round()).collect();
        // (0,5,b2) -> (2,0,b0) -> (2,0,b1)
        assert_eq!(widths, vec![373., 116., 156.]);
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let config = Config::default();
        let t = TensorData::zeros([25, 13, 13]);
        let anchors = config.anchors.scale(0).unwrap();
        let err = decode_feature_map(&t.view().unwrap(), 0, 13, anchors, &config).unwrap_err();
        assert!(matches!(err, PostProcessError::ShapeMismatch { .. }));
    }

    #[test]
    fn grid_mismatch_reports_the_scale() {
        let config = Config::default();
        let t = TensorData::zeros([24, 13, 13]);
        let anchors = config.anchors.scale(1).unwrap();
        match decode_feature_map(&t.view().unwrap(), 1, 26, anchors, &config) {
            Err(PostProcessError::ShapeMismatch {
                scale,
                expected,
                actual,
            }) => {
                assert_eq!(scale, 1);
                assert_eq!(expected, [24, 26, 26]);
                assert_eq!(actual, [24, 13, 13]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}

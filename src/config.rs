//! 後処理の設定とアンカーボックスのテーブル

use crate::error::{PostProcessError, Result};

/// アンカーボックスの (幅, 高さ)
///
/// デコード時に `exp(tw)`, `exp(th)` へそのまま掛けるため、入力画像のピクセル単位で持ちます。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub width: f32,
    pub height: f32,
}

impl Anchor {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// スケールごとのアンカーボックス
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTable {
    scales: Vec<Vec<Anchor>>,
}

impl AnchorTable {
    pub fn new(scales: Vec<Vec<Anchor>>) -> Self {
        Self { scales }
    }

    /// `[[w, h]; N]` の配列から作成します。
    pub fn from_pairs<const N: usize>(scales: &[[[f32; 2]; N]]) -> Self {
        Self::new(
            scales
                .iter()
                .map(|s| s.iter().map(|ab| Anchor::new(ab[0], ab[1])).collect())
                .collect(),
        )
    }

    /// YOLOv3 (416x416) の標準アンカー。13, 26, 52 グリッドの順
    #[rustfmt::skip]
    pub fn yolo_v3_416() -> Self {
        Self::from_pairs(&[
            [[116.,  90.], [156., 198.], [373., 326.]],
            [[ 30.,  61.], [ 62.,  45.], [ 59., 119.]],
            [[ 10.,  13.], [ 16.,  30.], [ 33.,  23.]],
        ])
    }

    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    /// 指定スケールのアンカー
    pub fn scale(&self, scale: usize) -> Option<&[Anchor]> {
        self.scales.get(scale).map(|s| s.as_slice())
    }
}

/// NMS の抑制ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionMode {
    /// クラスを区別せずに抑制する
    #[default]
    CrossClass,
    /// 同じクラス同士でのみ抑制する
    PerClass,
}

/// 後処理の設定
///
/// 呼び出し側で一度だけ作成し、各処理へ明示的に渡します。
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// 入力画像の幅
    pub input_width: usize,
    /// 入力画像の高さ
    pub input_height: usize,
    /// 検出とみなすコンフィデンスの閾値 (この値を超えたものを採用)
    pub confidence_threshold: f32,
    /// NMS の IoU 閾値
    pub iou_threshold: f32,
    /// クラス数
    pub num_classes: usize,
    /// 1グリッドあたりのアンカーボックス数
    pub boxes_per_cell: usize,
    /// スケールごとのグリッド数
    pub grid_sizes: Vec<usize>,
    pub anchors: AnchorTable,
    /// 出力する検出結果の最大数
    pub max_detections: usize,
    pub suppression: SuppressionMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_width: 416,
            input_height: 416,
            confidence_threshold: 0.7,
            iou_threshold: 0.5,
            num_classes: 3,
            boxes_per_cell: 3,
            grid_sizes: vec![13, 26, 52],
            anchors: AnchorTable::yolo_v3_416(),
            max_detections: 10,
            suppression: SuppressionMode::CrossClass,
        }
    }
}

impl Config {
    pub fn with_thresholds(mut self, confidence_threshold: f32, iou_threshold: f32) -> Self {
        self.confidence_threshold = confidence_threshold;
        self.iou_threshold = iou_threshold;
        self
    }

    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    pub fn with_suppression(mut self, suppression: SuppressionMode) -> Self {
        self.suppression = suppression;
        self
    }

    /// グリッドとアンカーをまとめて差し替えます。
    pub fn with_scales(mut self, grid_sizes: Vec<usize>, anchors: AnchorTable) -> Self {
        self.grid_sizes = grid_sizes;
        self.anchors = anchors;
        self
    }

    /// 1アンカーあたりのチャネル数 (x, y, w, h, objectness + クラス数)
    pub fn channels_per_box(&self) -> usize {
        self.num_classes + 5
    }

    /// 1スケールあたりのチャネル数
    pub fn expected_channels(&self) -> usize {
        self.boxes_per_cell * self.channels_per_box()
    }

    /// 指定スケールで期待されるテンソル形状 (channel, row, column)
    pub fn expected_shape(&self, scale: usize) -> Option<[usize; 3]> {
        self.grid_sizes
            .get(scale)
            .map(|&g| [self.expected_channels(), g, g])
    }

    /// 1グリッドの一辺のピクセル数
    pub fn block_size(&self, grid_size: usize) -> f32 {
        self.input_width as f32 / grid_size as f32
    }

    /// 設定値の整合性を検証します。
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(PostProcessError::InvalidConfig(msg)) };

        if self.input_width == 0 || self.input_height == 0 {
            return invalid("input size must be non-zero".into());
        }
        if self.input_width != self.input_height {
            return invalid(format!(
                "square input expected, got {}x{}",
                self.input_width, self.input_height
            ));
        }
        if self.num_classes == 0 {
            return invalid("num_classes must be non-zero".into());
        }
        if self.boxes_per_cell == 0 {
            return invalid("boxes_per_cell must be non-zero".into());
        }
        if self.max_detections == 0 {
            return invalid("max_detections must be non-zero".into());
        }
        if !(0. ..=1.).contains(&self.confidence_threshold) {
            return invalid(format!(
                "confidence_threshold out of [0, 1]: {}",
                self.confidence_threshold
            ));
        }
        if !(0. ..=1.).contains(&self.iou_threshold) {
            return invalid(format!("iou_threshold out of [0, 1]: {}", self.iou_threshold));
        }
        if self.grid_sizes.len() != self.anchors.num_scales() {
            return invalid(format!(
                "{} grid sizes but {} anchor sets",
                self.grid_sizes.len(),
                self.anchors.num_scales()
            ));
        }
        for (scale, &g) in self.grid_sizes.iter().enumerate() {
            if g == 0 || self.input_width % g != 0 {
                return invalid(format!(
                    "grid size {} does not divide input width {}",
                    g, self.input_width
                ));
            }
            let anchors = self.anchors.scale(scale).unwrap_or_default();
            if anchors.len() != self.boxes_per_cell {
                return invalid(format!(
                    "scale {} has {} anchors, expected {}",
                    scale,
                    anchors.len(),
                    self.boxes_per_cell
                ));
            }
            if anchors.iter().any(|a| !(a.width > 0. && a.height > 0.)) {
                return invalid(format!("scale {} has a non-positive anchor", scale));
            }
        }
        Ok(())
    }
}

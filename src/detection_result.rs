//! 物体検出の結果を保持するモジュール

use std::fmt;

use crate::geometry::Rect;

/// 検出結果 (デコード直後の候補と NMS 後の検出で共通)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionData {
    /// クラス
    pub class: usize,
    /// コンフィデンス (objectness * クラス確率)
    pub score: f32,
    /// 入力画像座標系のバウンディングボックス
    pub rect: Rect,
}

/// デコード直後の候補
pub type Candidate = DetectionData;
/// NMS を通過した検出結果
pub type Detection = DetectionData;

impl DetectionData {
    pub fn new(class: usize, score: f32, rect: Rect) -> Self {
        Self { class, score, rect }
    }

    /// YOLOの1アンカー分のデコード結果から作成します。
    ///
    /// # Args
    /// * `cx`, `cy` - 中心座標
    /// * `w`, `h` - BBoxのサイズ
    /// * `class` - クラスID
    /// * `score` - コンフィデンス
    ///
    /// # Return
    /// * 左上座標に変換した DetectionData
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, class: usize, score: f32) -> Self {
        Self::new(class, score, Rect::from_center(cx, cy, w, h))
    }
}

impl fmt::Display for DetectionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "class={} score={:.3} rect=({:.1}, {:.1}, {:.1}, {:.1})",
            self.class, self.score, self.rect.x, self.rect.y, self.rect.width, self.rect.height
        )
    }
}

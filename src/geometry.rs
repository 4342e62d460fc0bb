//! 活性化関数とバウンディングボックスの幾何計算

/// ロジスティックシグモイド
#[inline]
pub fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}

/// 左上座標と幅・高さで表した軸平行の矩形
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 中心座標とサイズから矩形を作成します。丸めは行いません。
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2., cy - height / 2., width, height)
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2., self.y + self.height / 2.)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// x軸、y軸それぞれの倍率で拡大縮小した矩形を返します。
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// 2つの矩形の Intersection over Union を計算します。
///
/// # Args
/// * `a`, `b` - 比較する矩形
///
/// # Return
/// * IoU。和集合の面積が0の場合は0
pub fn iou(a: &Rect, b: &Rect) -> f32 {
    let iw = (a.max_x().min(b.max_x()) - a.x.max(b.x)).max(0.);
    let ih = (a.max_y().min(b.max_y()) - a.y.max(b.y)).max(0.);
    let intersection = iw * ih;
    let union = a.area() + b.area() - intersection;
    if union <= 0. {
        0.
    } else {
        intersection / union
    }
}

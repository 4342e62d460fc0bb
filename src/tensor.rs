//! 推論エンジンが出力する3次元テンソルへのアクセスを扱うモジュール
//!
//! テンソルは (channel, row, column) の3軸で参照され、各軸のストライドは
//! 生成側から明示的に与えられます。連続配置は仮定しません。

use crate::error::{PostProcessError, Result};

/// 借用した `f32` バッファ上の読み取り専用3次元ビュー
#[derive(Debug, Clone, Copy)]
pub struct Tensor<'a> {
    data: &'a [f32],
    shape: [usize; 3],
    strides: [usize; 3],
}

impl<'a> Tensor<'a> {
    /// ストライドを指定してテンソルビューを作成します。
    ///
    /// # Args
    /// * `data` - 元データ
    /// * `shape` - (channel, row, column) の各軸の大きさ
    /// * `strides` - 各軸のストライド (要素数)
    ///
    /// # Return
    /// * 最大オフセットが `data` に収まらない場合は `BufferTooSmall`
    pub fn new(data: &'a [f32], shape: [usize; 3], strides: [usize; 3]) -> Result<Self> {
        let needed = required_len(shape, strides)?;
        if data.len() < needed {
            return Err(PostProcessError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            shape,
            strides,
        })
    }

    /// channel-major で詰めて配置されたバッファからテンソルビューを作成します。
    pub fn from_contiguous(data: &'a [f32], shape: [usize; 3]) -> Result<Self> {
        Self::new(data, shape, contiguous_strides(shape))
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn rows(&self) -> usize {
        self.shape[1]
    }

    pub fn cols(&self) -> usize {
        self.shape[2]
    }

    /// (channel, row, column) の値を読み出します。
    ///
    /// # Args
    /// * `c` - チャネル
    /// * `y` - 行
    /// * `x` - 列
    ///
    /// # Return
    /// * 形状の外側を指定した場合は `IndexOutOfRange`
    #[inline]
    pub fn get(&self, c: usize, y: usize, x: usize) -> Result<f32> {
        let out_of_range = || PostProcessError::IndexOutOfRange {
            index: [c, y, x],
            shape: self.shape,
        };
        if c >= self.shape[0] || y >= self.shape[1] || x >= self.shape[2] {
            return Err(out_of_range());
        }
        let offset = c * self.strides[0] + y * self.strides[1] + x * self.strides[2];
        self.data.get(offset).copied().ok_or_else(out_of_range)
    }
}

/// 所有権を持つテンソル
///
/// アーカイブや推論エンジンから受け取ったテンソルを保持し、
/// `view` で [`Tensor`] として参照します。
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    pub data: Vec<f32>,
    pub shape: [usize; 3],
    pub strides: [usize; 3],
}

impl TensorData {
    pub fn new(data: Vec<f32>, shape: [usize; 3], strides: [usize; 3]) -> Self {
        Self {
            data,
            shape,
            strides,
        }
    }

    /// channel-major で詰めて配置されたデータから作成します。
    pub fn contiguous(data: Vec<f32>, shape: [usize; 3]) -> Self {
        Self::new(data, shape, contiguous_strides(shape))
    }

    /// 全要素が0のテンソルを作成します。
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self::contiguous(vec![0.; shape[0] * shape[1] * shape[2]], shape)
    }

    /// 形状とストライドを検証した上でビューを返します。
    pub fn view(&self) -> Result<Tensor<'_>> {
        Tensor::new(&self.data, self.shape, self.strides)
    }
}

/// channel-major の連続配置に対応するストライド
pub fn contiguous_strides(shape: [usize; 3]) -> [usize; 3] {
    [shape[1] * shape[2], shape[2], 1]
}

fn required_len(shape: [usize; 3], strides: [usize; 3]) -> Result<usize> {
    if shape.iter().any(|&s| s == 0) {
        return Ok(0);
    }
    let overflow = || PostProcessError::BufferTooSmall {
        needed: usize::MAX,
        got: 0,
    };
    let mut last = 0usize;
    for (s, st) in shape.iter().zip(strides.iter()) {
        let step = (s - 1).checked_mul(*st).ok_or_else(overflow)?;
        last = last.checked_add(step).ok_or_else(overflow)?;
    }
    Ok(last + 1)
}

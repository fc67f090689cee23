//! 有理数类型, 用于帧率、时钟节拍等场景.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 例如: VUI 中 time_scale=60000, num_units_in_tick=1001 的帧率为 30000/1001 (29.97fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: u64,
    /// 分母
    pub den: u64,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: u64, den: u64) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 转换为 f64 浮点数
    ///
    /// 如果分母为 0, 返回 `f64::NAN`.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        self.num as f64 / self.den as f64
    }

    /// 对有理数进行约分
    pub fn reduce(self) -> Self {
        let g = gcd(self.num, self.den);
        if g == 0 {
            return self;
        }
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

//! 磁场逆解
//!
//! 给定 SAM 当前速度、期望速度、时间步长和位置，求出水平/竖直两路
//! 驱动电流 `(Ih, Iv)`。
//!
//! 水平驱动为 `left = -Ih, right = +Ih`，竖直驱动为 `up = +Iv, down = -Iv`，
//! 因此合场为 `B = Ih·H + Iv·V`，其中
//!
//! ```text
//! H = a_r ŵ_r - a_l ŵ_l
//! V = a_u ŵ_u - a_d ŵ_d
//! ```
//!
//! 所需力 `F = m (v_d - v_c) / Δt`，对应场 `B = F / k`，2×2 方程组用
//! Cramer 法则闭式求解。行列式接近零时返回 [`SolveError::Degenerate`]。

use crate::error::SolveError;
use crate::geometry::Vector2f;
use crate::solenoid::{CoilGeometry, CoilSlot, Solenoid};
use serde::{Deserialize, Serialize};

/// 单位磁场对应的力 (N/T)
pub const FORCE_PER_TESLA: f64 = 1.0;

/// 默认 SAM 质量 (kg)
pub const DEFAULT_MASS: f64 = 0.01;

/// 行列式阈值
pub const DEFAULT_DETERMINANT_EPSILON: f64 = 1e-12;

/// 两路驱动电流
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Currents {
    /// 水平驱动 Ih (A)
    pub horizontal: f64,
    /// 竖直驱动 Iv (A)
    pub vertical: f64,
}

impl Currents {
    pub const ZERO: Self = Self {
        horizontal: 0.0,
        vertical: 0.0,
    };

    pub fn new(horizontal: f64, vertical: f64) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.horizontal.is_finite() && self.vertical.is_finite()
    }

    /// 限幅到 ±max
    pub fn clamped(self, max: f64) -> Self {
        Self {
            horizontal: self.horizontal.clamp(-max, max),
            vertical: self.vertical.clamp(-max, max),
        }
    }
}

/// 两路驱动在某一位置的单位电流场向量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveVectors {
    pub horizontal: Vector2f,
    pub vertical: Vector2f,
}

impl DriveVectors {
    pub fn determinant(&self) -> f64 {
        self.horizontal.cross(self.vertical)
    }
}

/// 逆解器
#[derive(Debug, Clone)]
pub struct InverseSolver {
    coils: [Solenoid; 4],
    mass: f64,
    determinant_epsilon: f64,
}

impl Default for InverseSolver {
    fn default() -> Self {
        Self::new(&CoilGeometry::default(), DEFAULT_MASS)
    }
}

impl InverseSolver {
    pub fn new(geometry: &CoilGeometry, mass: f64) -> Self {
        Self {
            coils: Solenoid::arrangement(geometry),
            mass,
            determinant_epsilon: DEFAULT_DETERMINANT_EPSILON,
        }
    }

    pub fn with_determinant_epsilon(mut self, epsilon: f64) -> Self {
        self.determinant_epsilon = epsilon;
        self
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn coils(&self) -> &[Solenoid; 4] {
        &self.coils
    }

    /// 计算 `position` 处的 H、V 向量
    pub fn drive_vectors(&self, position: Vector2f) -> Result<DriveVectors, SolveError> {
        let unit = |slot: CoilSlot| {
            self.coils[slot.index()]
                .unit_field(position)
                .ok_or(SolveError::CoincidentCoil {
                    index: slot.index(),
                })
        };
        let up = unit(CoilSlot::Up)?;
        let down = unit(CoilSlot::Down)?;
        let left = unit(CoilSlot::Left)?;
        let right = unit(CoilSlot::Right)?;

        Ok(DriveVectors {
            horizontal: right - left,
            vertical: up - down,
        })
    }

    /// 求解驱动电流
    ///
    /// `dt` 为时间步长（秒）。
    ///
    /// # 错误
    ///
    /// - `SolveError::InvalidInput`: 输入含非有限值或 `dt <= 0`
    /// - `SolveError::CoincidentCoil`: SAM 与某个线圈重合
    /// - `SolveError::Degenerate`: 方程组接近奇异
    pub fn solve(
        &self,
        current_velocity: Vector2f,
        desired_velocity: Vector2f,
        dt: f64,
        position: Vector2f,
    ) -> Result<Currents, SolveError> {
        if !current_velocity.is_finite() || !desired_velocity.is_finite() || !position.is_finite()
        {
            return Err(SolveError::InvalidInput(
                "non-finite velocity or position".to_string(),
            ));
        }
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SolveError::InvalidInput(format!("timestep must be positive, got {}", dt)));
        }

        let force = (desired_velocity - current_velocity) * (self.mass / dt);
        let field = force * (1.0 / FORCE_PER_TESLA);
        self.currents_for_field(field, position)
    }

    /// 求产生指定合场所需的驱动电流
    pub fn currents_for_field(
        &self,
        field: Vector2f,
        position: Vector2f,
    ) -> Result<Currents, SolveError> {
        let drive = self.drive_vectors(position)?;
        let det = drive.determinant();
        if !det.is_finite() || det.abs() < self.determinant_epsilon {
            return Err(SolveError::Degenerate { determinant: det });
        }

        let horizontal = field.cross(drive.vertical) / det;
        let vertical = drive.horizontal.cross(field) / det;
        Ok(Currents::new(horizontal, vertical))
    }
}

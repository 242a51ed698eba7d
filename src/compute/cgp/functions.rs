//! Node function sets.
//!
//! A function set fixes the value type flowing through a circuit, the
//! available node functions with their arity, and how numerically failing
//! results are recovered.

use std::f64::consts::PI;
use std::fmt::Debug;

/// Upper bound of [`FunctionSet::LANES`] over all function sets.
pub const MAX_LANES: usize = 16;

/// Node functions and value type of a CGP circuit.
pub trait FunctionSet: Copy + Default + Debug + Send + Sync + 'static {
    /// Value flowing between nodes.
    type Value: Copy + Default + PartialEq + Debug + Send + Sync + 'static;

    /// Number of node functions; function ids are `0..COUNT`.
    const COUNT: u8;

    /// Fitness cases processed together by the batched evaluator.
    const LANES: usize;

    /// Number of node inputs a function reads (0, 1 or 2).
    fn arity(function: u8) -> usize;

    /// Apply a function to its inputs. Unused inputs are ignored.
    fn apply(function: u8, a: Self::Value, b: Self::Value) -> Self::Value;

    /// Fallback constant for an exceptional result, `None` if the value is fine.
    fn recover(value: Self::Value) -> Option<Self::Value>;
}

/// Symbolic regression functions over `f64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Symbolic;

/// Symbolic regression node functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymbolicOp {
    Add,
    Sub,
    Mul,
    Div,
    Sin,
    Cos,
    Exp,
    Log,
    Abs,
}

impl SymbolicOp {
    pub const ALL: [SymbolicOp; 9] = [
        SymbolicOp::Add,
        SymbolicOp::Sub,
        SymbolicOp::Mul,
        SymbolicOp::Div,
        SymbolicOp::Sin,
        SymbolicOp::Cos,
        SymbolicOp::Exp,
        SymbolicOp::Log,
        SymbolicOp::Abs,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

/// Replacement for nodes producing an infinity.
pub const INFINITY_SENTINEL: f64 = 1.5;

/// Replacement for nodes producing NaN.
pub const NAN_SENTINEL: f64 = PI;

impl FunctionSet for Symbolic {
    type Value = f64;

    const COUNT: u8 = SymbolicOp::ALL.len() as u8;
    const LANES: usize = 4;

    fn arity(function: u8) -> usize {
        match SymbolicOp::from_id(function) {
            Some(SymbolicOp::Add | SymbolicOp::Sub | SymbolicOp::Mul | SymbolicOp::Div) => 2,
            Some(_) => 1,
            None => 0,
        }
    }


    fn apply(function: u8, a: f64, b: f64) -> f64 {
        match SymbolicOp::from_id(function) {
            Some(SymbolicOp::Add) => a + b,
            Some(SymbolicOp::Sub) => a - b,
            Some(SymbolicOp::Mul) => a * b,
            Some(SymbolicOp::Div) => a / b,
            Some(SymbolicOp::Sin) => a.sin(),
            Some(SymbolicOp::Cos) => a.cos(),
            Some(SymbolicOp::Exp) => a.exp(),
            Some(SymbolicOp::Log) => a.ln(),
            Some(SymbolicOp::Abs) => a.abs(),
            None => f64::NAN,
        }
    }

    fn recover(value: f64) -> Option<f64> {
        if value.is_infinite() {
            Some(INFINITY_SENTINEL)
        } else if value.is_nan() {
            Some(NAN_SENTINEL)
        } else {
            None
        }
    }
}

/// 8-bit image filter functions over a 3x3 pixel window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelFilter;

/// Image filter node functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilterOp {
    C255,
    Identity,
    Inversion,
    Or,
    Not1Or2,
    And,
    Nand,
    Xor,
    Rshift1,
    Rshift2,
    Swap,
    Add,
    AddSat,
    Avg,
    Max,
    Min,
}

impl FilterOp {
    pub const ALL: [FilterOp; 16] = [
        FilterOp::C255,
        FilterOp::Identity,
        FilterOp::Inversion,
        FilterOp::Or,
        FilterOp::Not1Or2,
        FilterOp::And,
        FilterOp::Nand,
        FilterOp::Xor,
        FilterOp::Rshift1,
        FilterOp::Rshift2,
        FilterOp::Swap,
        FilterOp::Add,
        FilterOp::AddSat,
        FilterOp::Avg,
        FilterOp::Max,
        FilterOp::Min,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

impl FunctionSet for PixelFilter {
    type Value = u8;

    const COUNT: u8 = FilterOp::ALL.len() as u8;
    const LANES: usize = 16;

    fn arity(function: u8) -> usize {
        match FilterOp::from_id(function) {
            Some(FilterOp::C255) | None => 0,
            Some(
                FilterOp::Identity | FilterOp::Inversion | FilterOp::Rshift1 | FilterOp::Rshift2,
            ) => 1,
            Some(_) => 2,
        }
    }


    fn apply(function: u8, a: u8, b: u8) -> u8 {
        match FilterOp::from_id(function) {
            Some(FilterOp::C255) | None => 255,
            Some(FilterOp::Identity) => a,
            Some(FilterOp::Inversion) => 255 - a,
            Some(FilterOp::Or) => a | b,
            Some(FilterOp::Not1Or2) => !a | b,
            Some(FilterOp::And) => a & b,
            Some(FilterOp::Nand) => !(a & b),
            Some(FilterOp::Xor) => a ^ b,
            Some(FilterOp::Rshift1) => a >> 1,
            Some(FilterOp::Rshift2) => a >> 2,
            Some(FilterOp::Swap) => ((a & 0x0F) << 4) | (b & 0x0F),
            Some(FilterOp::Add) => a.wrapping_add(b),
            Some(FilterOp::AddSat) => a.saturating_add(b),
            Some(FilterOp::Avg) => ((a as u16 + b as u16) >> 1) as u8,
            Some(FilterOp::Max) => a.max(b),
            Some(FilterOp::Min) => a.min(b),
        }
    }

    fn recover(_value: u8) -> Option<u8> {
        None
    }
}

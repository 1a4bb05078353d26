//! Closed vocabulary of candidate operation kinds.
//!
//! The engine never registers operations dynamically: every kind an edge can
//! carry is enumerated here, and the factory seam is asked to build concrete
//! instances per kind. Identity and zero carry special markers: they bypass
//! stochastic path drop, and zero-kind instances are excluded from the live
//! operation count.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Identity,
    Zero,
    SepConv3,
    SepConv5,
    DilConv3,
    MaxPool3,
    AvgPool3,
}

impl OpKind {
    /// Every kind, in catalog order. Edge construction instantiates one
    /// operation per entry.
    pub const ALL: [OpKind; 7] = [
        OpKind::Identity,
        OpKind::Zero,
        OpKind::SepConv3,
        OpKind::SepConv5,
        OpKind::DilConv3,
        OpKind::MaxPool3,
        OpKind::AvgPool3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Identity => "identity",
            OpKind::Zero => "zero",
            OpKind::SepConv3 => "sep_conv_3x3",
            OpKind::SepConv5 => "sep_conv_5x5",
            OpKind::DilConv3 => "dil_conv_3x3",
            OpKind::MaxPool3 => "max_pool_3x3",
            OpKind::AvgPool3 => "avg_pool_3x3",
        }
    }

    /// Zero-kind operations contribute nothing and are excluded from the
    /// live operation count.
    pub fn is_zero(self) -> bool {
        matches!(self, OpKind::Zero)
    }

    /// Identity and zero skip stochastic path drop during evaluation.
    pub fn is_passthrough(self) -> bool {
        matches!(self, OpKind::Identity | OpKind::Zero)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static NAME_TABLE: Lazy<HashMap<&'static str, OpKind>> =
    Lazy::new(|| OpKind::ALL.iter().map(|&k| (k.name(), k)).collect());

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NAME_TABLE
            .get(s)
            .copied()
            .ok_or_else(|| anyhow!("unknown operation kind '{s}'"))
    }
}

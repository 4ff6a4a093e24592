use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MfaError;

/// A stage of the aluminium supply chain: bauxite → alumina → aluminium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mineral {
    Bauxite,
    Alumina,
    Aluminium,
}

impl Mineral {
    pub const CHAIN: [Mineral; 3] = [Mineral::Bauxite, Mineral::Alumina, Mineral::Aluminium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mineral::Bauxite => "bauxite",
            Mineral::Alumina => "alumina",
            Mineral::Aluminium => "aluminium",
        }
    }

    /// The mineral made from this one, if any.
    pub fn product(&self) -> Option<Mineral> {
        match self {
            Mineral::Bauxite => Some(Mineral::Alumina),
            Mineral::Alumina => Some(Mineral::Aluminium),
            Mineral::Aluminium => None,
        }
    }

    pub fn precursor(&self) -> Option<Mineral> {
        match self {
            Mineral::Bauxite => None,
            Mineral::Alumina => Some(Mineral::Bauxite),
            Mineral::Aluminium => Some(Mineral::Alumina),
        }
    }

    /// kg of this mineral needed per kg of its product.
    pub fn input_intensity(&self) -> f64 {
        match self {
            Mineral::Bauxite => 2.8764,
            Mineral::Alumina => 1.93538,
            Mineral::Aluminium => 1.0,
        }
    }

    /// Stages from `self` up to and including `downstream`, or `None` when
    /// `downstream` is not reachable from `self`.
    pub fn stages_to(&self, downstream: Mineral) -> Option<Vec<Mineral>> {
        let start = Self::CHAIN.iter().position(|m| m == self)?;
        let end = Self::CHAIN.iter().position(|m| *m == downstream)?;
        if start > end {
            return None;
        }
        Some(Self::CHAIN[start..=end].to_vec())
    }
}

impl fmt::Display for Mineral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mineral {
    type Err = MfaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bauxite" => Ok(Mineral::Bauxite),
            "alumina" => Ok(Mineral::Alumina),
            "aluminium" | "aluminum" => Ok(Mineral::Aluminium),
            other => Err(MfaError::UnknownMineral(other.to_string())),
        }
    }
}

/// Which view of the customs data a trade matrix was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeFlow {
    /// Importer reports only.
    Imports,
    /// Exporter reports only.
    Exports,
    /// Reconciled between both reports.
    Reconciled,
}

impl TradeFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeFlow::Imports => "imports",
            TradeFlow::Exports => "exports",
            TradeFlow::Reconciled => "reconciled",
        }
    }
}

impl fmt::Display for TradeFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeFlow {
    type Err = MfaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imports" => Ok(TradeFlow::Imports),
            "exports" => Ok(TradeFlow::Exports),
            "reconciled" => Ok(TradeFlow::Reconciled),
            other => Err(MfaError::InvalidData(format!("unknown trade flow '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_links_are_consistent() {
        for m in Mineral::CHAIN {
            if let Some(p) = m.product() {
                assert_eq!(p.precursor(), Some(m));
            }
        }
        assert_eq!(Mineral::Aluminium.product(), None);
        assert_eq!(Mineral::Bauxite.precursor(), None);
    }

    #[test]
    fn stages_follow_the_chain() {
        assert_eq!(
            Mineral::Bauxite.stages_to(Mineral::Aluminium),
            Some(vec![Mineral::Bauxite, Mineral::Alumina, Mineral::Aluminium])
        );
        assert_eq!(
            Mineral::Alumina.stages_to(Mineral::Alumina),
            Some(vec![Mineral::Alumina])
        );
        assert_eq!(Mineral::Aluminium.stages_to(Mineral::Bauxite), None);
    }

    #[test]
    fn parses_names() {
        assert_eq!("Aluminum".parse::<Mineral>().unwrap(), Mineral::Aluminium);
        assert_eq!(" bauxite ".parse::<Mineral>().unwrap(), Mineral::Bauxite);
        assert!("copper".parse::<Mineral>().is_err());
        assert_eq!(
            "reconciled".parse::<TradeFlow>().unwrap(),
            TradeFlow::Reconciled
        );
    }
}

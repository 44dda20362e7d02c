//! Scenario model and the line-oriented scenario file parser.
//!
//! A scenario file is a sequence of `key = value` records. Leading whitespace
//! is ignored, keys are case-insensitive, `#`-prefixed and blank lines are
//! skipped. Values are scalars, 1-D vectors `[a b c]`, 2-D matrices
//! `[[a b] [c d]]` or 3-D tables `[[[a] [b]] [[c] [d]]]`. The three counts
//! (`num_cips`, `num_pm_types`, `num_vm_types`) are mandatory and must appear
//! before the arrays whose shapes depend on them; missing optional arrays
//! default to zeros / all-off.

use std::fmt;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::core::power_model::LinearPowerModel;

/// Errors produced while reading a scenario file.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read scenario file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed scenario file (line {line}): {reason}")]
    Malformed { line: usize, reason: String },
    #[error("inconsistent scenario: {0}")]
    Inconsistent(String),
}

/// A complete description of the providers, their resources, prices and
/// workload. Read-only once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Number of cloud infrastructure providers.
    pub num_cips: usize,
    /// Number of PM types.
    pub num_pm_types: usize,
    /// Number of VM types.
    pub num_vm_types: usize,
    /// Number of PMs per CIP and PM type.
    pub cip_num_pms: Vec<Vec<usize>>,
    /// Number of VMs per CIP and VM type.
    pub cip_num_vms: Vec<Vec<usize>>,
    /// Initial power state of every individual PM, per CIP (PMs ordered by
    /// type, as counted by `cip_num_pms`).
    pub cip_pm_power_states: Vec<Vec<bool>>,
    /// Revenue per CIP and VM type ($/hour/VM).
    pub cip_revenues: Vec<Vec<f64>>,
    /// Electricity price per CIP ($/kWh).
    pub cip_electricity_costs: Vec<f64>,
    /// Cost of switching a PM off, per CIP and PM type ($).
    pub cip_pm_asleep_costs: Vec<Vec<f64>>,
    /// Cost of switching a PM on, per CIP and PM type ($).
    pub cip_pm_awake_costs: Vec<Vec<f64>>,
    /// Cost of migrating one VM from a CIP to another CIP, per VM type ($).
    /// Indexed as `[src][dst][vm_type]`.
    pub cip_to_cip_vm_migration_costs: Vec<Vec<Vec<f64>>>,
    /// Power model per PM type.
    pub pm_power_models: Vec<LinearPowerModel>,
    /// CPU share requirement per VM type and PM type, in [0, 1].
    pub vm_spec_cpus: Vec<Vec<f64>>,
    /// RAM share requirement per VM type and PM type, in [0, 1].
    pub vm_spec_rams: Vec<Vec<f64>>,
}

impl Scenario {
    /// Reads a scenario from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses a scenario from its textual form.
    pub fn parse(text: &str) -> Result<Self, ScenarioError> {
        Parser::default().parse(text)
    }

    /// Total number of PMs owned by the given CIP.
    pub fn num_pms_of(&self, cip: usize) -> usize {
        self.cip_num_pms[cip].iter().sum()
    }

    /// Total number of VMs served by the given CIP.
    pub fn num_vms_of(&self, cip: usize) -> usize {
        self.cip_num_vms[cip].iter().sum()
    }
}

const KEY_NUM_CIPS: &str = "num_cips";
const KEY_NUM_PM_TYPES: &str = "num_pm_types";
const KEY_NUM_VM_TYPES: &str = "num_vm_types";
const KEY_REVENUES: &str = "cip_revenues";
const KEY_PM_MIN_POWERS: &str = "pm_spec_min_powers";
const KEY_PM_MAX_POWERS: &str = "pm_spec_max_powers";
const KEY_NUM_PMS: &str = "cip_num_pms";
const KEY_NUM_VMS: &str = "cip_num_vms";
const KEY_POWER_STATES: &str = "cip_pm_power_states";
const KEY_ELECTRICITY: &str = "cip_electricity_costs";
const KEY_ELECTRICITY_ALIAS: &str = "cip_wcosts";
const KEY_ASLEEP_COSTS: &str = "cip_pm_asleep_costs";
const KEY_AWAKE_COSTS: &str = "cip_pm_awake_costs";
const KEY_MIGRATION_COSTS: &str = "cip_to_cip_vm_migration_costs";
const KEY_VM_CPUS: &str = "vm_spec_cpus";
const KEY_VM_RAMS: &str = "vm_spec_rams";

const KEYS: &[&str] = &[
    KEY_NUM_CIPS,
    KEY_NUM_PM_TYPES,
    KEY_NUM_VM_TYPES,
    KEY_REVENUES,
    KEY_PM_MIN_POWERS,
    KEY_PM_MAX_POWERS,
    KEY_NUM_PMS,
    KEY_NUM_VMS,
    KEY_POWER_STATES,
    KEY_ELECTRICITY,
    KEY_ELECTRICITY_ALIAS,
    KEY_ASLEEP_COSTS,
    KEY_AWAKE_COSTS,
    KEY_MIGRATION_COSTS,
    KEY_VM_CPUS,
    KEY_VM_RAMS,
];

#[derive(Default)]
struct Parser {
    num_cips: Option<usize>,
    num_pm_types: Option<usize>,
    num_vm_types: Option<usize>,
    cip_num_pms: Option<Vec<Vec<usize>>>,
    cip_num_vms: Option<Vec<Vec<usize>>>,
    cip_pm_power_states: Option<Vec<Vec<bool>>>,
    cip_revenues: Option<Vec<Vec<f64>>>,
    cip_electricity_costs: Option<Vec<f64>>,
    cip_pm_asleep_costs: Option<Vec<Vec<f64>>>,
    cip_pm_awake_costs: Option<Vec<Vec<f64>>>,
    cip_to_cip_vm_migration_costs: Option<Vec<Vec<Vec<f64>>>>,
    pm_spec_min_powers: Option<Vec<f64>>,
    pm_spec_max_powers: Option<Vec<f64>>,
    vm_spec_cpus: Option<Vec<Vec<f64>>>,
    vm_spec_rams: Option<Vec<Vec<f64>>>,
}

impl Parser {
    fn parse(mut self, text: &str) -> Result<Scenario, ScenarioError> {
        for (idx, raw_line) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw_line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let lowered = trimmed.to_ascii_lowercase();
            // Lines not starting with a known key are ignored.
            let Some(&key) = KEYS.iter().find(|k| lowered.starts_with(*k)) else {
                continue;
            };
            let eq = lowered
                .find('=')
                .ok_or_else(|| malformed(line, "'=' is missing"))?;
            let mut cur = Cursor::new(&lowered[eq + 1..], line);
            self.record(key, &mut cur, line)?;
        }
        self.build()
    }

    fn record(&mut self, key: &str, cur: &mut Cursor, line: usize) -> Result<(), ScenarioError> {
        match key {
            KEY_NUM_CIPS => self.num_cips = Some(cur.usize()?),
            KEY_NUM_PM_TYPES => self.num_pm_types = Some(cur.usize()?),
            KEY_NUM_VM_TYPES => self.num_vm_types = Some(cur.usize()?),
            KEY_REVENUES => {
                let (n, v) = (self.cips(key, line)?, self.vm_types(key, line)?);
                self.cip_revenues = Some(cur.matrix_f64(n, v)?);
            }
            KEY_PM_MIN_POWERS => {
                let t = self.pm_types(key, line)?;
                self.pm_spec_min_powers = Some(cur.vec_f64(t)?);
            }
            KEY_PM_MAX_POWERS => {
                let t = self.pm_types(key, line)?;
                self.pm_spec_max_powers = Some(cur.vec_f64(t)?);
            }
            KEY_NUM_PMS => {
                let (n, t) = (self.cips(key, line)?, self.pm_types(key, line)?);
                self.cip_num_pms = Some(cur.matrix_usize(n, t)?);
            }
            KEY_NUM_VMS => {
                let (n, v) = (self.cips(key, line)?, self.vm_types(key, line)?);
                self.cip_num_vms = Some(cur.matrix_usize(n, v)?);
            }
            KEY_POWER_STATES => {
                let n = self.cips(key, line)?;
                let counts = self.cip_num_pms.as_ref().ok_or_else(|| {
                    malformed(line, "cip_num_pms must be declared before cip_pm_power_states")
                })?;
                let mut states = Vec::with_capacity(n);
                cur.expect_open()?;
                for counts_row in counts.iter().take(n) {
                    let num_pms: usize = counts_row.iter().sum();
                    states.push(cur.vec_bool(num_pms)?);
                }
                cur.expect_close()?;
                self.cip_pm_power_states = Some(states);
            }
            KEY_ELECTRICITY | KEY_ELECTRICITY_ALIAS => {
                let n = self.cips(key, line)?;
                self.cip_electricity_costs = Some(cur.vec_f64(n)?);
            }
            KEY_ASLEEP_COSTS => {
                let (n, t) = (self.cips(key, line)?, self.pm_types(key, line)?);
                self.cip_pm_asleep_costs = Some(cur.matrix_f64(n, t)?);
            }
            KEY_AWAKE_COSTS => {
                let (n, t) = (self.cips(key, line)?, self.pm_types(key, line)?);
                self.cip_pm_awake_costs = Some(cur.matrix_f64(n, t)?);
            }
            KEY_MIGRATION_COSTS => {
                let (n, v) = (self.cips(key, line)?, self.vm_types(key, line)?);
                self.cip_to_cip_vm_migration_costs = Some(cur.cube_f64(n, n, v)?);
            }
            KEY_VM_CPUS => {
                let (v, t) = (self.vm_types(key, line)?, self.pm_types(key, line)?);
                self.vm_spec_cpus = Some(cur.matrix_f64(v, t)?);
            }
            KEY_VM_RAMS => {
                let (v, t) = (self.vm_types(key, line)?, self.pm_types(key, line)?);
                self.vm_spec_rams = Some(cur.matrix_f64(v, t)?);
            }
            _ => unreachable!("unhandled scenario key"),
        }
        Ok(())
    }

    fn cips(&self, key: &str, line: usize) -> Result<usize, ScenarioError> {
        self.num_cips
            .filter(|&n| n > 0)
            .ok_or_else(|| malformed(line, format!("num_cips must be declared before {key}")))
    }

    fn pm_types(&self, key: &str, line: usize) -> Result<usize, ScenarioError> {
        self.num_pm_types
            .filter(|&n| n > 0)
            .ok_or_else(|| malformed(line, format!("num_pm_types must be declared before {key}")))
    }

    fn vm_types(&self, key: &str, line: usize) -> Result<usize, ScenarioError> {
        self.num_vm_types
            .filter(|&n| n > 0)
            .ok_or_else(|| malformed(line, format!("num_vm_types must be declared before {key}")))
    }

    fn build(self) -> Result<Scenario, ScenarioError> {
        let num_cips = self.num_cips.unwrap_or(0);
        let num_pm_types = self.num_pm_types.unwrap_or(0);
        let num_vm_types = self.num_vm_types.unwrap_or(0);
        if num_cips == 0 {
            return Err(ScenarioError::Inconsistent(
                "number of CIPs must be a positive number".into(),
            ));
        }
        if num_pm_types == 0 {
            return Err(ScenarioError::Inconsistent(
                "number of PM types must be a positive number".into(),
            ));
        }
        if num_vm_types == 0 {
            return Err(ScenarioError::Inconsistent(
                "number of VM types must be a positive number".into(),
            ));
        }

        let cip_num_pms = self
            .cip_num_pms
            .unwrap_or_else(|| vec![vec![0; num_pm_types]; num_cips]);
        let cip_num_vms = self
            .cip_num_vms
            .unwrap_or_else(|| vec![vec![0; num_vm_types]; num_cips]);
        // Default: all PMs are off.
        let cip_pm_power_states = self.cip_pm_power_states.unwrap_or_else(|| {
            cip_num_pms
                .iter()
                .map(|counts| vec![false; counts.iter().sum()])
                .collect()
        });
        let min_powers = self.pm_spec_min_powers.unwrap_or_else(|| vec![0.0; num_pm_types]);
        let max_powers = self.pm_spec_max_powers.unwrap_or_else(|| vec![0.0; num_pm_types]);
        let pm_power_models = min_powers
            .iter()
            .zip(&max_powers)
            .map(|(&lo, &hi)| LinearPowerModel::new(lo, hi))
            .collect();

        Ok(Scenario {
            num_cips,
            num_pm_types,
            num_vm_types,
            cip_num_pms,
            cip_num_vms,
            cip_pm_power_states,
            cip_revenues: self
                .cip_revenues
                .unwrap_or_else(|| vec![vec![0.0; num_vm_types]; num_cips]),
            cip_electricity_costs: self.cip_electricity_costs.unwrap_or_else(|| vec![0.0; num_cips]),
            cip_pm_asleep_costs: self
                .cip_pm_asleep_costs
                .unwrap_or_else(|| vec![vec![0.0; num_pm_types]; num_cips]),
            cip_pm_awake_costs: self
                .cip_pm_awake_costs
                .unwrap_or_else(|| vec![vec![0.0; num_pm_types]; num_cips]),
            cip_to_cip_vm_migration_costs: self
                .cip_to_cip_vm_migration_costs
                .unwrap_or_else(|| vec![vec![vec![0.0; num_vm_types]; num_cips]; num_cips]),
            pm_power_models,
            vm_spec_cpus: self
                .vm_spec_cpus
                .unwrap_or_else(|| vec![vec![0.0; num_pm_types]; num_vm_types]),
            vm_spec_rams: self
                .vm_spec_rams
                .unwrap_or_else(|| vec![vec![0.0; num_pm_types]; num_vm_types]),
        })
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> ScenarioError {
    ScenarioError::Malformed {
        line,
        reason: reason.into(),
    }
}

/// Token cursor over the value part of a record.
struct Cursor<'a> {
    toks: Vec<&'a str>,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(value: &'a str, line: usize) -> Self {
        let mut toks = Vec::new();
        let mut rest = value;
        while !rest.is_empty() {
            let mut chars = rest.char_indices();
            match chars.next() {
                Some((_, c)) if c.is_whitespace() => {
                    rest = rest.trim_start();
                }
                Some((_, '[')) => {
                    toks.push("[");
                    rest = &rest[1..];
                }
                Some((_, ']')) => {
                    toks.push("]");
                    rest = &rest[1..];
                }
                Some(_) => {
                    let end = rest
                        .find(|c: char| c.is_whitespace() || c == '[' || c == ']')
                        .unwrap_or(rest.len());
                    toks.push(&rest[..end]);
                    rest = &rest[end..];
                }
                None => break,
            }
        }
        Self { toks, pos: 0, line }
    }

    fn next_tok(&mut self, what: &str) -> Result<&'a str, ScenarioError> {
        let tok = self
            .toks
            .get(self.pos)
            .copied()
            .ok_or_else(|| malformed(self.line, format!("{what} is missing")))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect_open(&mut self) -> Result<(), ScenarioError> {
        match self.next_tok("'['")? {
            "[" => Ok(()),
            _ => Err(malformed(self.line, "'[' is missing")),
        }
    }

    fn expect_close(&mut self) -> Result<(), ScenarioError> {
        match self.next_tok("']'")? {
            "]" => Ok(()),
            _ => Err(malformed(self.line, "']' is missing")),
        }
    }

    fn usize(&mut self) -> Result<usize, ScenarioError> {
        let tok = self.next_tok("a number")?;
        tok.parse()
            .map_err(|_| malformed(self.line, format!("invalid non-negative integer '{tok}'")))
    }

    fn f64(&mut self) -> Result<f64, ScenarioError> {
        let tok = self.next_tok("a number")?;
        tok.parse()
            .map_err(|_| malformed(self.line, format!("invalid number '{tok}'")))
    }

    fn bool01(&mut self) -> Result<bool, ScenarioError> {
        let tok = self.next_tok("a power state")?;
        match tok {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(malformed(self.line, format!("invalid power state '{tok}'"))),
        }
    }

    fn vec_f64(&mut self, n: usize) -> Result<Vec<f64>, ScenarioError> {
        self.expect_open()?;
        let row = (0..n).map(|_| self.f64()).collect::<Result<_, _>>()?;
        self.expect_close()?;
        Ok(row)
    }

    fn vec_usize(&mut self, n: usize) -> Result<Vec<usize>, ScenarioError> {
        self.expect_open()?;
        let row = (0..n).map(|_| self.usize()).collect::<Result<_, _>>()?;
        self.expect_close()?;
        Ok(row)
    }

    fn vec_bool(&mut self, n: usize) -> Result<Vec<bool>, ScenarioError> {
        self.expect_open()?;
        let row = (0..n).map(|_| self.bool01()).collect::<Result<_, _>>()?;
        self.expect_close()?;
        Ok(row)
    }

    fn matrix_f64(&mut self, rows: usize, cols: usize) -> Result<Vec<Vec<f64>>, ScenarioError> {
        self.expect_open()?;
        let m = (0..rows).map(|_| self.vec_f64(cols)).collect::<Result<_, _>>()?;
        self.expect_close()?;
        Ok(m)
    }

    fn matrix_usize(&mut self, rows: usize, cols: usize) -> Result<Vec<Vec<usize>>, ScenarioError> {
        self.expect_open()?;
        let m = (0..rows).map(|_| self.vec_usize(cols)).collect::<Result<_, _>>()?;
        self.expect_close()?;
        Ok(m)
    }

    fn cube_f64(&mut self, n1: usize, n2: usize, n3: usize) -> Result<Vec<Vec<Vec<f64>>>, ScenarioError> {
        self.expect_open()?;
        let cube = (0..n1)
            .map(|_| self.matrix_f64(n2, n3))
            .collect::<Result<_, _>>()?;
        self.expect_close()?;
        Ok(cube)
    }
}

fn fmt_vec<T: fmt::Display>(f: &mut fmt::Formatter, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

fn fmt_matrix<T: fmt::Display>(f: &mut fmt::Formatter, rows: &[Vec<T>]) -> fmt::Result {
    write!(f, "[")?;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        fmt_vec(f, row)?;
    }
    write!(f, "]")
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "num_cips={}, num_pm_types={}, num_vm_types={}",
            self.num_cips, self.num_pm_types, self.num_vm_types
        )?;
        write!(f, ", cip_revenues=")?;
        fmt_matrix(f, &self.cip_revenues)?;
        write!(f, ", pm_spec_min_powers=")?;
        fmt_vec(f, &self.pm_power_models.iter().map(|m| m.min_power()).collect::<Vec<_>>())?;
        write!(f, ", pm_spec_max_powers=")?;
        fmt_vec(f, &self.pm_power_models.iter().map(|m| m.max_power()).collect::<Vec<_>>())?;
        write!(f, ", cip_num_pms=")?;
        fmt_matrix(f, &self.cip_num_pms)?;
        write!(f, ", cip_pm_power_states=")?;
        write!(f, "[")?;
        for (i, row) in self.cip_pm_power_states.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            fmt_vec(f, &row.iter().map(|&b| b as u8).collect::<Vec<_>>())?;
        }
        write!(f, "]")?;
        write!(f, ", cip_num_vms=")?;
        fmt_matrix(f, &self.cip_num_vms)?;
        write!(f, ", cip_electricity_costs=")?;
        fmt_vec(f, &self.cip_electricity_costs)?;
        write!(f, ", cip_pm_asleep_costs=")?;
        fmt_matrix(f, &self.cip_pm_asleep_costs)?;
        write!(f, ", cip_pm_awake_costs=")?;
        fmt_matrix(f, &self.cip_pm_awake_costs)?;
        write!(f, ", cip_to_cip_vm_migration_costs=[")?;
        for (i, plane) in self.cip_to_cip_vm_migration_costs.iter().enumerate() {
            if i > 0 {
                write!(f, "  ")?;
            }
            fmt_matrix(f, plane)?;
        }
        write!(f, "]")?;
        write!(f, ", vm_spec_cpus=")?;
        fmt_matrix(f, &self.vm_spec_cpus)?;
        write!(f, ", vm_spec_rams=")?;
        fmt_matrix(f, &self.vm_spec_rams)?;
        Ok(())
    }
}

//! Time-windowed trajectory storage.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::sim::SimRecord;

/// One species' samples; `None` marks "no data" at that time point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub samples: Vec<Option<f64>>,
}

/// A strictly increasing time axis plus one equally long series per species.
///
/// Series keep the order in which species were first seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateBuffer {
    time: Vec<f64>,
    series: Vec<Series>,
}

/// Result of a batch simulation: a fully populated buffer.
pub type Trajectory = StateBuffer;

impl StateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit columns, checking lengths and time ordering.
    pub fn from_parts<I, S>(time: Vec<f64>, series: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<Option<f64>>)>,
        S: Into<String>,
    {
        if time.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(SimError::InvalidArg {
                what: "buffer time axis must be strictly increasing",
            });
        }
        let mut buffer = Self {
            time,
            series: Vec::new(),
        };
        for (id, samples) in series {
            let id = id.into();
            if samples.len() != buffer.time.len() {
                return Err(SimError::InvalidArg {
                    what: "series length must match time axis",
                });
            }
            if buffer.index_of(&id).is_some() {
                return Err(SimError::InvalidArg {
                    what: "duplicate series id",
                });
            }
            buffer.series.push(Series { id, samples });
        }
        Ok(buffer)
    }

    /// Wrap an integrator record, one series per state entry.
    pub fn from_record<I, S>(ids: I, record: &SimRecord) -> SimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if record.x.iter().any(|x| x.len() != ids.len()) {
            return Err(SimError::InvalidArg {
                what: "record state width does not match species ids",
            });
        }
        let series = ids.into_iter().enumerate().map(|(i, id)| {
            let samples = record.x.iter().map(|x| Some(x[i])).collect();
            (id, samples)
        });
        Self::from_parts(record.t.clone(), series)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.series.iter().position(|s| s.id == id)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn species_ids(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.id.as_str())
    }

    pub fn series(&self, id: &str) -> Option<&[Option<f64>]> {
        self.index_of(id).map(|i| self.series[i].samples.as_slice())
    }

    pub fn iter_series(&self) -> std::slice::Iter<'_, Series> {
        self.series.iter()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.time.last().copied()
    }

    /// Most recent sample of a species, if tracked and present.
    pub fn last_sample(&self, id: &str) -> Option<f64> {
        self.series(id).and_then(|s| s.last().copied().flatten())
    }

    /// Splice `other` onto the end of this buffer.
    ///
    /// `other`'s times are shifted by this buffer's final time. Leading
    /// samples of `other` that would not be strictly after that time (the
    /// shared t=0 point of a fresh integration) are dropped. Species missing
    /// on either side are padded with `None`. Returns the number of time
    /// points appended.
    pub fn concat(&mut self, other: &StateBuffer) -> usize {
        let offset = self.last_time().unwrap_or(0.0);
        let skip = match self.last_time() {
            Some(last) => other.time.partition_point(|t| t + offset <= last),
            None => 0,
        };
        let appended = other.len() - skip;
        if appended == 0 {
            return 0;
        }
        let existing = self.len();

        self.time
            .extend(other.time[skip..].iter().map(|t| t + offset));

        for s in &mut self.series {
            match other.series(&s.id) {
                Some(samples) => s.samples.extend_from_slice(&samples[skip..]),
                None => s.samples.resize(existing + appended, None),
            }
        }
        for o in &other.series {
            if self.index_of(&o.id).is_none() {
                let mut samples = vec![None; existing];
                samples.extend_from_slice(&o.samples[skip..]);
                self.series.push(Series {
                    id: o.id.clone(),
                    samples,
                });
            }
        }
        appended
    }

    /// Drop every leading sample older than `latest_time - window`.
    ///
    /// Returns the number of time points removed.
    pub fn trim(&mut self, window: f64) -> usize {
        let Some(latest) = self.last_time() else {
            return 0;
        };
        let cutoff = latest - window;
        let drop = self.time.partition_point(|t| *t < cutoff);
        if drop > 0 {
            self.time.drain(..drop);
            for s in &mut self.series {
                s.samples.drain(..drop);
            }
        }
        drop
    }

    /// Add `offset` to the most recent sample of one species.
    ///
    /// Returns the perturbed value.
    pub fn perturb(&mut self, id: &str, offset: f64) -> SimResult<f64> {
        if !offset.is_finite() {
            return Err(SimError::InvalidArg {
                what: "perturbation offset must be finite",
            });
        }
        let index = self.index_of(id).ok_or_else(|| SimError::UnknownSpecies {
            id: id.to_string(),
        })?;
        match self.series[index].samples.last_mut() {
            Some(Some(value)) => {
                let next = *value + offset;
                if !next.is_finite() {
                    return Err(SimError::InvalidArg {
                        what: "perturbed value must be finite",
                    });
                }
                *value = next;
                Ok(next)
            }
            _ => Err(SimError::MissingSample {
                species: id.to_string(),
            }),
        }
    }
}

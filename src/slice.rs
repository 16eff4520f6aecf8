//! Per-axis member selections and the cartesian product of points of view.

use std::fmt;

use serde::Serialize;

use crate::member::{Member, MemberList};
use crate::metadata::MemberId;

/// The five fixed axes every subcube operation is expressed over, in
/// enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Axis {
    Scenario,
    Year,
    Period,
    Entity,
    Value,
}

impl Axis {
    pub const ALL: [Axis; 5] = [
        Axis::Scenario,
        Axis::Year,
        Axis::Period,
        Axis::Entity,
        Axis::Value,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn dimension_name(self) -> &'static str {
        match self {
            Self::Scenario => "Scenario",
            Self::Year => "Year",
            Self::Period => "Period",
            Self::Entity => "Entity",
            Self::Value => "Value",
        }
    }

    fn short_code(self) -> &'static str {
        match self {
            Self::Scenario => "S",
            Self::Year => "Y",
            Self::Period => "P",
            Self::Entity => "E",
            Self::Value => "V",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dimension_name())
    }
}

/// Member specifications per axis, as given on the command line. An axis
/// left as `None` is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisSpecs {
    specs: [Option<Vec<String>>; 5],
}

impl AxisSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, axis: Axis, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(axis, specs);
        self
    }

    pub fn set<I, S>(&mut self, axis: Axis, specs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specs[axis.index()] = Some(specs.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, axis: Axis) -> Option<&[String]> {
        self.specs[axis.index()].as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, &[String])> {
        Axis::ALL
            .into_iter()
            .filter_map(|axis| self.get(axis).map(|specs| (axis, specs)))
    }
}

/// One member list per assigned axis.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    axes: [Option<MemberList>; 5],
}

impl Slice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, axis: Axis, members: MemberList) {
        self.axes[axis.index()] = Some(members);
    }

    pub fn get(&self, axis: Axis) -> Option<&MemberList> {
        self.axes[axis.index()].as_ref()
    }

    pub fn is_assigned(&self, axis: Axis) -> bool {
        self.axes[axis.index()].is_some()
    }

    pub fn combos(&self) -> Combos<'_> {
        let mut shape = [1usize; 5];
        for axis in Axis::ALL {
            if let Some(list) = self.get(axis) {
                shape[axis.index()] = list.len();
            }
        }

        let mut strides = [1usize; 5];
        for i in (0..shape.len() - 1).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }

        Combos {
            slice: self,
            strides,
            total: shape.iter().product(),
        }
    }
}

/// The cartesian product of a slice's axes. Scenario is the outermost loop
/// and Value the innermost; iteration can be restarted any number of times.
#[derive(Debug, Clone, Copy)]
pub struct Combos<'a> {
    slice: &'a Slice,
    strides: [usize; 5],
    total: usize,
}

impl<'a> Combos<'a> {
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn get(&self, index: usize) -> Option<Pov<'a>> {
        if index >= self.total {
            return None;
        }

        let mut coordinates = [None; 5];
        let mut remaining = index;
        for axis in Axis::ALL {
            let position = remaining / self.strides[axis.index()];
            remaining %= self.strides[axis.index()];
            if let Some(list) = self.slice.get(axis) {
                coordinates[axis.index()] = Some(&list.members()[position]);
            }
        }

        Some(Pov { coordinates })
    }

    pub fn iter(&self) -> ComboIter<'a> {
        ComboIter {
            combos: *self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &Combos<'a> {
    type Item = Pov<'a>;
    type IntoIter = ComboIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ComboIter<'a> {
    combos: Combos<'a>,
    next: usize,
}

impl<'a> Iterator for ComboIter<'a> {
    type Item = Pov<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let pov = self.combos.get(self.next)?;
        self.next += 1;
        Some(pov)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.combos.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ComboIter<'_> {}

/// One point of view: a member (or the unconstrained wildcard) per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pov<'a> {
    coordinates: [Option<&'a Member>; 5],
}

impl<'a> Pov<'a> {
    /// `None` means every member of the axis is in scope.
    pub fn member(&self, axis: Axis) -> Option<&'a Member> {
        self.coordinates[axis.index()]
    }

    pub fn id(&self, axis: Axis) -> Option<MemberId> {
        self.member(axis).map(|member| member.id)
    }

    pub fn entity_parent(&self) -> Option<MemberId> {
        self.member(Axis::Entity)
            .and_then(|entity| entity.parent.as_ref())
            .map(|parent| parent.id)
    }
}

impl fmt::Display for Pov<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for axis in Axis::ALL {
            let Some(member) = self.member(axis) else {
                continue;
            };
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}#{}", axis.short_code(), member)?;
            first = false;
        }
        Ok(())
    }
}

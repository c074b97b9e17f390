use super::client_details::ClientDetails;
use super::error::BatonStateError;
use super::facade::ControlFacade;

/// Which baton actions the user may trigger right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlActions {
    pub request: bool,
    pub claim: bool,
    pub release: bool,
    pub assign: bool,
}

/// Locally derived view of who holds exclusive control.
///
/// Rebuilt from scratch on every refresh. A snapshot naming more than one holder is
/// refused, so a `BatonState` never describes two simultaneous holders.
#[derive(Debug, Clone, PartialEq)]
pub struct BatonState {
    pub am_i_holder: bool,
    pub is_held: bool,
    pub holder: Option<ClientDetails>,
    pub me: ClientDetails,
    pub others: Vec<ClientDetails>,
}

impl BatonState {
    pub fn from_snapshot(
        am_i_holder: bool,
        is_held: bool,
        holder: Option<ClientDetails>,
        me: ClientDetails,
        others: Vec<ClientDetails>,
    ) -> Result<Self, BatonStateError> {
        let mut holders: Vec<i32> = std::iter::once(&me)
            .chain(others.iter())
            .chain(holder.iter())
            .filter(|c| c.has_baton)
            .map(|c| c.index)
            .collect();
        if let Some(h) = &holder {
            holders.push(h.index);
        }
        if am_i_holder {
            holders.push(me.index);
        }
        holders.sort_unstable();
        holders.dedup();
        if holders.len() > 1 {
            return Err(BatonStateError::MultipleHolders(holders));
        }

        Ok(Self {
            am_i_holder,
            is_held: is_held || am_i_holder || holder.is_some(),
            holder,
            me,
            others,
        })
    }

    /// Pull a fresh snapshot from the server
    pub fn fetch(facade: &dyn ControlFacade) -> Result<Self, BatonStateError> {
        let am_i_holder = facade.am_i_baton_holder()?;
        let is_held = facade.is_baton_held()?;
        let holder = if is_held {
            facade.get_baton_holder()?
        } else {
            None
        };
        let me = facade.get_my_details()?;
        let others = facade.get_other_client_information()?;
        Self::from_snapshot(am_i_holder, is_held, holder, me, others)
    }

    /// Whether the current holder's authorisation level allows us to take the baton
    pub fn can_claim(&self) -> bool {
        if self.am_i_holder {
            return false;
        }
        match &self.holder {
            Some(h) => self.me.authorisation_level >= h.authorisation_level,
            None => true,
        }
    }

    pub fn can_request(&self) -> bool {
        !self.am_i_holder
    }

    pub fn can_release(&self) -> bool {
        self.am_i_holder
    }

    pub fn can_assign(&self, target_index: i32) -> bool {
        self.am_i_holder
            && target_index != self.me.index
            && self.others.iter().any(|c| c.index == target_index)
    }

    pub fn actions(&self) -> ControlActions {
        ControlActions {
            request: self.can_request(),
            claim: self.can_claim(),
            release: self.can_release(),
            assign: self.am_i_holder && !self.others.is_empty(),
        }
    }

    /// Every known client, this one first
    pub fn clients(&self) -> impl Iterator<Item = &ClientDetails> {
        std::iter::once(&self.me).chain(self.others.iter())
    }

    pub fn holder_index(&self) -> Option<i32> {
        if self.am_i_holder {
            Some(self.me.index)
        } else {
            self.holder.as_ref().map(|h| h.index)
        }
    }

    pub fn holder_label(&self) -> String {
        if self.am_i_holder {
            String::from("You hold the baton")
        } else if let Some(h) = &self.holder {
            format!("Baton held by {}", h.describe())
        } else if self.is_held {
            String::from("Baton held by an unknown client")
        } else {
            String::from("Baton is free")
        }
    }
}

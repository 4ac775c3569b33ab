use fleetnode_util::types::{ApiKey, Udid};

/// The identity of this device with the remote management service
///
/// `udid` and `api_key` are required for network operations, `owner` and
/// `alias` may be empty until the remote assigns them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub udid: Udid,
    pub owner: String,
    pub alias: String,
    pub api_key: ApiKey,
}

impl DeviceIdentity {
    /// Replace the API key, returns `true` if the key changed
    pub fn set_api_key(&mut self, api_key: ApiKey) -> bool {
        if self.api_key == api_key {
            return false;
        }
        self.api_key = api_key;
        true
    }
}

/// Sparse update to the identity received from the remote
///
/// Only the fields present and non-empty in the response are kept, applying
/// an update never resets a field to empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityUpdate {
    alias: Option<String>,
    owner: Option<String>,
    udid: Option<Udid>,
}

/// What changed after applying an [`IdentityUpdate`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdentityChanges {
    /// Any field changed
    pub changed: bool,
    /// `owner` or `udid` changed, so the messaging channels need to be
    /// derived again
    pub channel: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl IdentityUpdate {
    pub fn new(alias: Option<String>, owner: Option<String>, udid: Option<String>) -> Self {
        Self {
            alias: non_empty(alias),
            owner: non_empty(owner),
            udid: non_empty(udid).map(Udid::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.alias.is_none() && self.owner.is_none() && self.udid.is_none()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn udid(&self) -> Option<&Udid> {
        self.udid.as_ref()
    }

    /// Merge the update into `identity`
    pub fn apply(&self, identity: &mut DeviceIdentity) -> IdentityChanges {
        let mut changes = IdentityChanges::default();

        if let Some(alias) = &self.alias
            && &identity.alias != alias
        {
            identity.alias = alias.clone();
            changes.changed = true;
        }

        if let Some(owner) = &self.owner
            && &identity.owner != owner
        {
            identity.owner = owner.clone();
            changes.changed = true;
            changes.channel = true;
        }

        if let Some(udid) = &self.udid
            && &identity.udid != udid
        {
            identity.udid = udid.clone();
            changes.changed = true;
            changes.channel = true;
        }

        changes
    }
}

//! Secondary identities.
//!
//! An account owner can claim additional addresses. Each claim creates an
//! inactive identity sharing the owner's credential and sends an activation
//! mail through the spam guard. The identity becomes active once the key
//! from that mail comes back.

mod model;
mod repository;

use tracing::info;

pub use model::{AccountId, Identity};
pub use repository::{IdentityRepository, IdentityStore};

use crate::{Error, Result};
use crate::addresslog::LogStore;
use crate::clock::Clock;
use crate::guard::SendOutcome;
use crate::key::{KeyGenerator, derive_local_id};
use crate::notify::{NotificationDispatcher, Transport};

/// Result of provisioning a secondary identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// Username of the identity, derived from the address.
    pub local_id: String,
    /// Activation key stored with the identity.
    pub key: String,
    /// Whether the identity was newly created.
    pub created: bool,
    /// What happened to the activation mail.
    pub delivery: SendOutcome,
}

/// Creates and confirms secondary identities.
pub struct AccountProvisioner<S, C, T, I> {
    dispatcher: NotificationDispatcher<S, C, T>,
    identities: I,
    keys: KeyGenerator,
}

impl<S, C, T, I> AccountProvisioner<S, C, T, I>
where
    S: LogStore,
    C: Clock,
    T: Transport,
    I: IdentityStore,
{
    /// Create a provisioner.
    pub const fn new(dispatcher: NotificationDispatcher<S, C, T>, identities: I) -> Self {
        Self {
            dispatcher,
            identities,
            keys: KeyGenerator::new(),
        }
    }

    /// The dispatcher used for activation and connection mails.
    pub const fn dispatcher(&self) -> &NotificationDispatcher<S, C, T> {
        &self.dispatcher
    }

    /// The identity store.
    pub const fn identities(&self) -> &I {
        &self.identities
    }

    /// Claim `new_email` for `owner`'s account.
    ///
    /// Creates the pending identity, clears the owner's address log and
    /// sends the activation mail. The local id depends only on `new_email`,
    /// so repeated calls address the same identity, and a pending identity
    /// keeps the key it was created with: every activation mail for it
    /// carries the same key, whether or not the guard lets a repeat through.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::IdentityTaken`] if another account claimed the
    /// address, [`crate::Error::IdentityActive`] if it is already confirmed,
    /// or an error if a store or the transport fails.
    pub async fn provision_secondary_identity(
        &self,
        new_email: &str,
        owner: &Identity,
    ) -> Result<ProvisionOutcome> {
        let local_id = derive_local_id(new_email);
        let now = self.dispatcher.guard().clock().now();

        let candidate =
            Identity::pending_secondary(&local_id, new_email, owner, self.keys.new_key(), now);
        let (stored, created) = self.identities.upsert_pending(&candidate).await?;
        let key = match stored.activation_key {
            Some(key) if !stored.is_active => key,
            _ => return Err(Error::IdentityActive(stored.email)),
        };

        self.dispatcher.guard().store().delete_all(&owner.email).await?;

        let delivery = self.dispatcher.send_activation_mail(&key, new_email).await?;
        info!(
            email = %new_email,
            account_id = %owner.account_id,
            created,
            sent = delivery.is_sent(),
            "Provisioned secondary identity"
        );

        Ok(ProvisionOutcome {
            local_id,
            key,
            created,
            delivery,
        })
    }

    /// Activate the pending identity holding `key`.
    ///
    /// Clears the address log of the confirmed address. Returns `None` if no
    /// pending identity holds the key.
    ///
    /// # Errors
    ///
    /// Returns an error if a store fails.
    pub async fn confirm_secondary_identity(&self, key: &str) -> Result<Option<Identity>> {
        let Some(identity) = self.identities.activate_by_key(key).await? else {
            return Ok(None);
        };

        self.dispatcher.guard().store().delete_all(&identity.email).await?;
        info!(email = %identity.email, account_id = %identity.account_id, "Confirmed secondary identity");
        Ok(Some(identity))
    }

    /// Ask the owner of `recipient` to connect it to `account_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log store or the transport fails.
    pub async fn connect_existing_identity(
        &self,
        key: &str,
        recipient: &str,
        account_id: AccountId,
    ) -> Result<SendOutcome> {
        self.dispatcher
            .send_connection_mail(key, recipient, account_id)
            .await
    }

    /// All identities of an account, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity store fails.
    pub async fn identities_of_account(&self, account_id: AccountId) -> Result<Vec<Identity>> {
        self.identities.list_for_account(account_id).await
    }

    /// Record a login of `username` at the current time.
    ///
    /// Returns `false` if no such identity exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity store fails.
    pub async fn record_login(&self, username: &str) -> Result<bool> {
        let now = self.dispatcher.guard().clock().now();
        self.identities.record_login(username, now).await
    }

    /// Forget every notification recorded for `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log store fails.
    pub async fn delete_log_entries(&self, email: &str) -> Result<u64> {
        self.dispatcher.guard().store().delete_all(email).await
    }
}

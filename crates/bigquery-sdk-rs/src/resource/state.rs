use serde_json::Value;

use super::{Attribute, Insertable, PatchQueue, ResourceKind, Updater};
use crate::Client;
use crate::path::ResourcePath;
use crate::service::DeleteOptions;

/// How much of a resource's server state is held locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fidelity {
    /// Only the identity is known.
    Reference,
    /// A body from a list call, holding a subset of the fields.
    Partial,
    /// A body from a get, insert or patch. A missing field means unset.
    Full,
}

/// Fidelity tracker and lazy loader for a single resource.
///
/// Not internally synchronized: every mutating method takes `&mut self`.
#[derive(Debug)]
pub struct ResourceState<K: ResourceKind> {
    client: Client,
    reference: K::Reference,
    fidelity: Fidelity,
    /// `None` iff `fidelity` is `Reference`.
    body: Option<K::Body>,
    exists: Option<bool>,
    patches: PatchQueue<K::Attr>,
}

impl<K: ResourceKind> ResourceState<K> {
    /// A handle on `reference` without fetching anything. Fails on an empty
    /// id, before any request is made.
    pub fn new_reference(client: Client, reference: K::Reference) -> crate::Result<Self> {
        K::path(&reference).validate()?;

        Ok(Self {
            client,
            reference,
            fidelity: Fidelity::Reference,
            body: None,
            exists: None,
            patches: PatchQueue::new(),
        })
    }

    pub(crate) fn from_json(client: Client, value: Value, fidelity: Fidelity) -> crate::Result<Self> {
        let body: K::Body = serde_json::from_value(value)?;
        Self::from_body(client, body, fidelity)
    }

    fn from_body(client: Client, body: K::Body, fidelity: Fidelity) -> crate::Result<Self> {
        let reference = K::reference_of(&body)
            .cloned()
            .ok_or_else(|| crate::Error::missing_field::<K::Body>("reference"))?;

        let mut state = Self::new_reference(client, reference)?;
        state.install(body, fidelity);
        Ok(state)
    }

    #[inline]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[inline]
    pub fn reference(&self) -> &K::Reference {
        &self.reference
    }

    pub fn path(&self) -> ResourcePath {
        K::path(&self.reference)
    }

    #[inline]
    pub fn fidelity(&self) -> Fidelity {
        self.fidelity
    }

    pub fn is_reference(&self) -> bool {
        self.fidelity == Fidelity::Reference
    }

    pub fn is_resource(&self) -> bool {
        !self.is_reference()
    }

    pub fn is_partial(&self) -> bool {
        self.fidelity == Fidelity::Partial
    }

    pub fn is_full(&self) -> bool {
        self.fidelity == Fidelity::Full
    }

    /// Whatever body is held, without fetching.
    pub fn body(&self) -> Option<&K::Body> {
        self.body.as_ref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.body.as_ref().and_then(K::etag_of)
    }

    pub fn patches(&self) -> &PatchQueue<K::Attr> {
        &self.patches
    }

    fn install(&mut self, body: K::Body, fidelity: Fidelity) -> &mut K::Body {
        self.fidelity = fidelity;
        self.exists = Some(true);
        self.body.insert(body)
    }

    async fn fetch(&mut self) -> crate::Result<&mut K::Body> {
        let path = self.path();
        debug!(
            message = "fetching full resource",
            resource = K::NAME,
            %path,
            from = ?self.fidelity,
        );

        let value = self.client.service().get_resource(&path).await?;
        let body: K::Body = serde_json::from_value(value)?;
        Ok(self.install(body, Fidelity::Full))
    }

    /// Installs a full body returned by some call other than get or patch.
    pub(crate) fn replace_json(&mut self, value: Value) -> crate::Result<&K::Body> {
        let body: K::Body = serde_json::from_value(value)?;
        Ok(self.install(body, Fidelity::Full))
    }

    /// The full body, fetching it first unless it is already held.
    pub async fn ensure_full(&mut self) -> crate::Result<&K::Body> {
        if self.fidelity == Fidelity::Full {
            if let Some(ref body) = self.body {
                return Ok(body);
            }
        }

        self.fetch().await.map(|body| &*body)
    }

    /// Any body, partial or full. Only a bare reference is fetched.
    pub async fn ensure_resource(&mut self) -> crate::Result<&K::Body> {
        if self.fidelity != Fidelity::Reference {
            if let Some(ref body) = self.body {
                return Ok(body);
            }
        }

        self.fetch().await.map(|body| &*body)
    }

    /// Unconditionally re-fetches the full body. Queued, unsent patches are
    /// dropped.
    pub async fn reload(&mut self) -> crate::Result<&K::Body> {
        self.patches.clear();
        self.exists = None;
        self.fetch().await.map(|body| &*body)
    }

    /// Whether the resource exists on the server. Memoized unless `force`;
    /// a held body counts as existing.
    pub async fn exists(&mut self, force: bool) -> crate::Result<bool> {
        if !force {
            if let Some(exists) = self.exists {
                return Ok(exists);
            }

            if self.is_resource() {
                self.exists = Some(true);
                return Ok(true);
            }
        }

        match self.reload().await.map(|_| ()) {
            Ok(()) => Ok(true),
            Err(error) if error.is_not_found() => {
                self.exists = Some(false);
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Sets a single attribute: upgrades to a full body, applies `apply`
    /// locally, then sends one patch and replaces the body with the response.
    ///
    /// A failed patch (including an ETag mismatch) is returned as-is. The
    /// local body then still holds the unconfirmed change until reloaded.
    pub async fn set<F>(&mut self, attr: K::Attr, apply: F) -> crate::Result<()>
    where
        F: FnOnce(&mut K::Body) + Send,
    {
        self.set_many(&[attr], apply).await
    }

    /// Like [`set`](Self::set), but for several attributes sent in one patch.
    pub async fn set_many<F>(&mut self, attrs: &[K::Attr], apply: F) -> crate::Result<()>
    where
        F: FnOnce(&mut K::Body) + Send,
    {
        self.ensure_full().await?;

        if let Some(body) = self.body.as_mut() {
            apply(body);
        }

        for attr in attrs {
            self.patches.push(*attr);
        }

        self.flush().await
    }

    /// Sends the changes accumulated by an [`Updater`] seeded from this
    /// resource's full body. Returns false (with no RPC) if nothing changed.
    pub async fn apply(&mut self, updater: Updater<K>) -> crate::Result<bool> {
        if !updater.has_changes() {
            return Ok(false);
        }

        let (body, patches) = updater.into_parts();
        self.install(body, Fidelity::Full);
        self.patches = patches;

        self.flush().await?;
        Ok(true)
    }

    async fn flush(&mut self) -> crate::Result<()> {
        if self.patches.is_empty() {
            return Ok(());
        }

        let queued = self.patches.take();
        let body = self.ensure_full().await?;
        let patch = queued.build(body, K::etag_of(body))?;

        let path = self.path();
        debug!(
            message = "patching resource",
            resource = K::NAME,
            %path,
            fields = ?patch.field_names().collect::<Vec<_>>(),
            etag = ?patch.etag,
        );

        let value = self.client.service().patch_resource(&path, patch).await?;
        let body: K::Body = serde_json::from_value(value)?;
        self.install(body, Fidelity::Full);
        Ok(())
    }

    /// Deletes the resource. The handle stays usable; only the existence memo
    /// changes.
    pub async fn delete(&mut self, options: DeleteOptions) -> crate::Result<()> {
        let path = self.path();
        debug!(message = "deleting resource", resource = K::NAME, %path);

        self.client.service().delete_resource(&path, options).await?;
        self.exists = Some(false);
        Ok(())
    }
}

impl<K: Insertable> ResourceState<K> {
    /// Sends everything set on a creation updater as one insert, wrapping the
    /// response as a full body.
    pub async fn insert(client: Client, updater: Updater<K>) -> crate::Result<Self> {
        let parent = K::parent(updater.reference());
        let body = updater.to_insert_body()?;

        debug!(
            message = "inserting resource",
            resource = K::NAME,
            %parent,
            fields = ?updater.queued().iter().map(Attribute::field_name).collect::<Vec<_>>(),
        );

        let value = client
            .service()
            .insert_resource(&parent, K::TYPE, body)
            .await?;

        Self::from_json(client, value, Fidelity::Full)
    }
}

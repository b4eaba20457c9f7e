use serde_json::Value;

use super::{Insertable, PatchBody, PatchQueue, ResourceBuilder, ResourceKind};

/// Deferred-mutation view of a resource body.
///
/// Setters change the local body and queue the attribute name, nothing more.
/// An updater holds no service handle, so operations that need one (reload,
/// delete, spawning jobs, reading data) do not exist on it:
///
/// ```compile_fail
/// # async fn demo(dataset: &mut bigquery_sdk_rs::dataset::Dataset) -> bigquery_sdk_rs::Result<()> {
/// dataset
///     .create_table("events", |table| {
///         table.reload();
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Updater<K: ResourceKind> {
    reference: K::Reference,
    body: K::Body,
    patches: PatchQueue<K::Attr>,
}

impl<K: ResourceKind> Updater<K> {
    /// Seeds an updater with an existing (full) body, for `update` blocks.
    pub fn from_body(body: K::Body) -> crate::Result<Self> {
        let reference = K::reference_of(&body)
            .cloned()
            .ok_or_else(|| crate::Error::missing_field::<K::Body>("reference"))?;

        Ok(Self {
            reference,
            body,
            patches: PatchQueue::new(),
        })
    }

    /// A fresh body carrying only `reference`, for creation.
    pub fn for_insert(reference: K::Reference) -> crate::Result<Self>
    where
        K: Insertable,
    {
        K::path(&reference).validate()?;

        Ok(Self {
            body: K::new_body(reference.clone()),
            reference,
            patches: PatchQueue::new(),
        })
    }

    pub fn reference(&self) -> &K::Reference {
        &self.reference
    }

    pub fn body(&self) -> &K::Body {
        &self.body
    }

    /// Applies `apply` to the body and queues `attr`.
    pub fn set<F>(&mut self, attr: K::Attr, apply: F)
    where
        F: FnOnce(&mut K::Body),
    {
        apply(&mut self.body);
        self.patches.push(attr);
    }

    /// Queues `attr` for a change already made through [`body_mut`](Self::body_mut).
    pub fn mark(&mut self, attr: K::Attr) {
        self.patches.push(attr);
    }

    pub(crate) fn body_mut(&mut self) -> &mut K::Body {
        &mut self.body
    }

    pub fn queued(&self) -> &PatchQueue<K::Attr> {
        &self.patches
    }

    pub fn has_changes(&self) -> bool {
        !self.patches.is_empty()
    }

    pub fn to_patch_body(&self) -> crate::Result<PatchBody> {
        self.patches.build(&self.body, K::etag_of(&self.body))
    }

    /// Everything set on a creation updater goes out in the insert.
    pub fn to_insert_body(&self) -> crate::Result<Value> {
        serde_json::to_value(&self.body).map_err(crate::Error::from)
    }

    pub(crate) fn into_parts(self) -> (K::Body, PatchQueue<K::Attr>) {
        (self.body, self.patches)
    }
}

impl<K: ResourceKind> ResourceBuilder for Updater<K> {
    type Kind = K;

    fn has_changes(&self) -> bool {
        Updater::has_changes(self)
    }

    fn into_updater(self) -> Updater<K> {
        self
    }
}

/// A mutable sub-object of an updater (access list, schema, labels).
///
/// Sub-objects don't notify their parent when mutated. The parent asks
/// `changed` when flushing and merges the sub-object only then.
pub trait SubResource {
    fn changed(&self) -> bool;
}

/// A value that keeps its starting copy, and counts as changed only when it
/// no longer equals it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tracked<T> {
    value: T,
    original: T,
}

impl<T: Clone + PartialEq> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            original: value.clone(),
            value,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: PartialEq> SubResource for Tracked<T> {
    fn changed(&self) -> bool {
        self.value != self.original
    }
}

impl<T> std::ops::Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use bigquery_model_rs::TableReference;
    use serde_json::json;

    use super::*;
    use crate::table::{TableAttr, TableKind};

    #[test]
    fn test_updater_queues_without_rpc() -> crate::Result<()> {
        let mut updater = Updater::<TableKind>::for_insert(TableReference::new("p", "d", "t"))?;
        assert!(!updater.has_changes());

        updater.set(TableAttr::FriendlyName, |body| body.friendly_name = Some("A".into()));
        updater.set(TableAttr::Description, |body| body.description = Some("B".into()));
        updater.set(TableAttr::FriendlyName, |body| body.friendly_name = Some("C".into()));

        assert!(updater.has_changes());
        assert_eq!(updater.queued().len(), 2);

        let patch = updater.to_patch_body()?;
        assert_eq!(
            patch.to_value(),
            json!({ "friendlyName": "C", "description": "B" })
        );

        let insert = updater.to_insert_body()?;
        assert_eq!(insert["tableReference"]["tableId"], "t");
        assert_eq!(insert["friendlyName"], "C");
        Ok(())
    }

    #[test]
    fn test_tracked() {
        let mut labels = Tracked::new(vec!["a"]);
        assert!(!labels.changed());
        assert_eq!(labels.len(), 1);

        assert!(labels.get_mut().contains(&"a"));
        assert!(!labels.changed());

        labels.get_mut().push("b");
        assert!(labels.changed());

        labels.get_mut().pop();
        assert!(!labels.changed());

        labels.get_mut().push("c");
        assert_eq!(labels.into_inner(), ["a", "c"]);
    }
}

//! Lifecycle shared by every resource handle.
//!
//! A handle starts out either as a bare reference (identity only), as a
//! partial body from a list call, or as a full body from a get, insert or
//! patch. [`ResourceState`] tracks which of the three it holds and upgrades
//! lazily. Live mutations go through a [`PatchQueue`] and hit the service
//! immediately. Batched mutations (creation, `update` blocks) go through an
//! [`Updater`], which has no service handle and so cannot issue RPCs at all.
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::path::{ResourcePath, ResourceType};

mod patch;
mod state;
mod updater;

pub use patch::{PatchBody, PatchQueue};
pub use state::{Fidelity, ResourceState};
pub use updater::{SubResource, Tracked, Updater};

/// Ties a reference type, a body type and its patchable attributes together.
pub trait ResourceKind: Send + Sync + 'static {
    type Reference: Clone + fmt::Debug + PartialEq + Send + Sync;
    type Body: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;
    type Attr: Attribute;

    /// Used in logs and error messages.
    const NAME: &'static str;

    fn path(reference: &Self::Reference) -> ResourcePath;

    fn reference_of(body: &Self::Body) -> Option<&Self::Reference>;

    fn etag_of(body: &Self::Body) -> Option<&str>;
}

/// Kinds that can be created through an insert call.
pub trait Insertable: ResourceKind {
    const TYPE: ResourceType;

    /// The collection owner the insert is sent to.
    fn parent(reference: &Self::Reference) -> ResourcePath;

    /// A body carrying nothing but the identity.
    fn new_body(reference: Self::Reference) -> Self::Body;
}

/// A patchable field of a body.
pub trait Attribute: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The camelCase key of the field on the wire.
    fn field_name(self) -> &'static str;
}

/// Capabilities of a live handle: everything that may need the service.
#[async_trait::async_trait]
pub trait ReadableResource: Send {
    type Kind: ResourceKind;

    fn state(&self) -> &ResourceState<Self::Kind>;

    fn state_mut(&mut self) -> &mut ResourceState<Self::Kind>;

    fn reference(&self) -> &<Self::Kind as ResourceKind>::Reference {
        self.state().reference()
    }

    fn is_reference(&self) -> bool {
        self.state().is_reference()
    }

    fn is_resource(&self) -> bool {
        self.state().is_resource()
    }

    fn is_partial(&self) -> bool {
        self.state().is_partial()
    }

    fn is_full(&self) -> bool {
        self.state().is_full()
    }

    /// Re-fetches the full body, dropping any queued but unsent changes.
    async fn reload(&mut self) -> crate::Result<&mut Self> {
        self.state_mut().reload().await?;
        Ok(self)
    }

    async fn exists(&mut self, force: bool) -> crate::Result<bool> {
        self.state_mut().exists(force).await
    }
}

/// Capabilities of a batched-mutation handle: setters plus a flush. Nothing
/// here can reach the service.
pub trait ResourceBuilder {
    type Kind: ResourceKind;

    fn has_changes(&self) -> bool;

    /// Merges any changed sub-objects and hands back the plain updater.
    fn into_updater(self) -> Updater<Self::Kind>;
}

/// Fetches `resource`, turning a not-found error into `None`. Any other
/// error is returned as-is.
pub(crate) async fn lookup<R: ReadableResource>(mut resource: R) -> crate::Result<Option<R>> {
    let result = resource.state_mut().reload().await.map(|_| ());

    match result {
        Ok(()) => Ok(Some(resource)),
        Err(error) if error.is_not_found() => {
            debug!(
                message = "lookup found nothing",
                resource = <R::Kind as ResourceKind>::NAME,
                path = %resource.state().path(),
            );
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

/// Declares an attribute enum, mapping each variant to its wire name.
macro_rules! attributes {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $($variant:ident => $field:literal),* $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),*
        }

        impl $crate::resource::Attribute for $name {
            fn field_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $field),*
                }
            }
        }
    };
}

/// Declares async accessors on a facade holding a `state` field. Each one
/// loads the body with the named `ResourceState` method (`ensure_full` or
/// `ensure_resource`) and projects a value out of it.
macro_rules! accessors {
    (
        $ensure:ident;
        $($(#[$attr:meta])* $name:ident -> $ty:ty = |$body:ident| $get:expr;)*
    ) => {
        $(
            $(#[$attr])*
            pub async fn $name(&mut self) -> crate::Result<$ty> {
                let $body = self.state.$ensure().await?;
                Ok($get)
            }
        )*
    };
}

pub(crate) use accessors;
pub(crate) use attributes;

//! The patch set installed into the game at load time.
//!
//! | Target method | Rule |
//! |---|---|
//! | `Verse.Game::InitNewGame` | [`RedirectConstructorRule`] from `IntVec3(int, int, int)` to [`create_custom_vector_ref`] |
//! | `RimWorld.Dialog_AdvancedGameConfig::DoWindowContents` | [`InsertAfterCallRule`] on `Listing.NewColumn()` with [`new_column_hook`] |
//!
//! The factory side of the redirect is [`crate::sizing::create_custom_vector`].

use crate::{
    assembly::MethodRef,
    patch::{EngineConfig, InsertAfterCallRule, PatchEngine, RedirectConstructorRule},
    Result,
};

/// Method that builds a new game, including its map-size vector.
pub const INIT_NEW_GAME: &str = "Verse.Game::InitNewGame";
/// Method that draws the advanced game configuration dialog.
pub const ADVANCED_CONFIG_WINDOW: &str = "RimWorld.Dialog_AdvancedGameConfig::DoWindowContents";

/// Name of the map-size redirect rule.
pub const MAP_SIZE_REDIRECT: &str = "map-size-redirect";
/// Name of the column hook rule.
pub const COLUMN_HOOK: &str = "column-hook";

const INT32: &str = "int32";
const INT_VEC3: &str = "Verse.IntVec3";
const LISTING: &str = "Verse.Listing";

/// `Verse.IntVec3::.ctor(int32, int32, int32)`
#[must_use]
pub fn intvec3_constructor() -> MethodRef {
    MethodRef::constructor(INT_VEC3, &[INT32, INT32, INT32])
}

/// `Verse.IntVec3 CustomMapSizes.CmsIlHelpers::CreateCustomVector(int32, int32, int32)`
#[must_use]
pub fn create_custom_vector_ref() -> MethodRef {
    MethodRef::static_method(
        "CustomMapSizes.CmsIlHelpers",
        "CreateCustomVector",
        &[INT32, INT32, INT32],
        Some(INT_VEC3),
    )
}

/// `instance void Verse.Listing::NewColumn()`
#[must_use]
pub fn listing_new_column() -> MethodRef {
    MethodRef::instance(LISTING, "NewColumn", &[], None)
}

/// Hook receiving the dialog's listing after its column break.
#[must_use]
pub fn new_column_hook() -> MethodRef {
    MethodRef::static_method(
        "CustomMapSizes.HarmonyPatches.Patch_Dialog_AdvancedGameConfig_DoWindowContents",
        "NewColumnPlus",
        &[LISTING],
        None,
    )
}

/// Builds an engine with the full patch set registered.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidRule`] only if the method references above are
/// inconsistent, which the crate's tests rule out.
pub fn default_engine(config: EngineConfig) -> Result<PatchEngine> {
    let mut engine = PatchEngine::new(config);
    engine
        .register(
            INIT_NEW_GAME,
            RedirectConstructorRule::new(
                MAP_SIZE_REDIRECT,
                intvec3_constructor(),
                create_custom_vector_ref(),
            )?,
        )
        .register(
            ADVANCED_CONFIG_WINDOW,
            InsertAfterCallRule::new(COLUMN_HOOK, listing_new_column(), new_column_hook())?,
        );
    Ok(engine)
}

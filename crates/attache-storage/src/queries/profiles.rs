// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `ai_profile` and `user_profile` singletons.

use attache_core::AttacheError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{AiProfile, UserProfile};

/// Read the agent persona. Returns defaults when never configured.
pub async fn get_ai_profile(db: &Database) -> Result<AiProfile, AttacheError> {
    db.connection()
        .call(|conn| {
            match conn.query_row(
                "SELECT system_prompt, identity_name, identity_role, traits, instructions,
                        greeting, response_length
                 FROM ai_profile WHERE id = 1",
                [],
                |row| {
                    Ok(AiProfile {
                        system_prompt: row.get(0)?,
                        identity_name: row.get(1)?,
                        identity_role: row.get(2)?,
                        traits: row.get(3)?,
                        instructions: row.get(4)?,
                        greeting: row.get(5)?,
                        response_length: row.get(6)?,
                    })
                },
            ) {
                Ok(profile) => Ok(profile),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(AiProfile::default()),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Idempotent upsert of the agent persona singleton.
pub async fn put_ai_profile(db: &Database, profile: &AiProfile) -> Result<(), AttacheError> {
    let profile = profile.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO ai_profile (id, system_prompt, identity_name, identity_role,
                     traits, instructions, greeting, response_length)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     system_prompt = excluded.system_prompt,
                     identity_name = excluded.identity_name,
                     identity_role = excluded.identity_role,
                     traits = excluded.traits,
                     instructions = excluded.instructions,
                     greeting = excluded.greeting,
                     response_length = excluded.response_length",
                params![
                    profile.system_prompt,
                    profile.identity_name,
                    profile.identity_role,
                    profile.traits,
                    profile.instructions,
                    profile.greeting,
                    profile.response_length,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Read the owner profile. Returns defaults when never configured.
pub async fn get_user_profile(db: &Database) -> Result<UserProfile, AttacheError> {
    db.connection()
        .call(|conn| {
            match conn.query_row(
                "SELECT name, profession, availability, notes FROM user_profile WHERE id = 1",
                [],
                |row| {
                    Ok(UserProfile {
                        name: row.get(0)?,
                        profession: row.get(1)?,
                        availability: row.get(2)?,
                        notes: row.get(3)?,
                    })
                },
            ) {
                Ok(profile) => Ok(profile),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(UserProfile::default()),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Idempotent upsert of the owner profile singleton.
pub async fn put_user_profile(db: &Database, profile: &UserProfile) -> Result<(), AttacheError> {
    let profile = profile.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO user_profile (id, name, profession, availability, notes)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     profession = excluded.profession,
                     availability = excluded.availability,
                     notes = excluded.notes",
                params![
                    profile.name,
                    profile.profession,
                    profile.availability,
                    profile.notes,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

//! Typed IAM record access: access keys, users, groups, named policies.

use crate::error::Result;
use crate::store::{decode_json, ReadTxn, WriteTxn};
use crate::tables::Keyspace;
use objvault_common::types::{AccessKey, IamGroup, IamPolicyRecord, IamUser};

pub fn get_access_key(rtx: &ReadTxn, access_key: &str) -> Result<Option<AccessKey>> {
    Ok(rtx
        .get(Keyspace::AccessKeys, access_key.as_bytes())?
        .and_then(|v| decode_json(Keyspace::AccessKeys, access_key.as_bytes(), &v)))
}

pub fn get_user(rtx: &ReadTxn, user_id: &str) -> Result<Option<IamUser>> {
    Ok(rtx
        .get(Keyspace::IamUsers, user_id.as_bytes())?
        .and_then(|v| decode_json(Keyspace::IamUsers, user_id.as_bytes(), &v)))
}

pub fn get_group(rtx: &ReadTxn, name: &str) -> Result<Option<IamGroup>> {
    Ok(rtx
        .get(Keyspace::IamGroups, name.as_bytes())?
        .and_then(|v| decode_json(Keyspace::IamGroups, name.as_bytes(), &v)))
}

pub fn get_policy(rtx: &ReadTxn, name: &str) -> Result<Option<IamPolicyRecord>> {
    Ok(rtx
        .get(Keyspace::IamPolicies, name.as_bytes())?
        .and_then(|v| decode_json(Keyspace::IamPolicies, name.as_bytes(), &v)))
}

/// Resolve the policy documents effective for a user: the user's own
/// attached policies plus those of every group the user belongs to.
pub fn policy_documents_for_user(rtx: &ReadTxn, user_id: &str) -> Result<Vec<String>> {
    let Some(user) = get_user(rtx, user_id)? else {
        return Ok(Vec::new());
    };

    let mut names: Vec<String> = user.policy_names.clone();
    for group_name in &user.groups {
        if let Some(group) = get_group(rtx, group_name)? {
            names.extend(group.policy_names);
        }
    }
    names.sort_unstable();
    names.dedup();

    let mut docs = Vec::with_capacity(names.len());
    for name in &names {
        if let Some(policy) = get_policy(rtx, name)? {
            docs.push(policy.document);
        }
    }
    Ok(docs)
}

// ── Applier mutations ─────────────────────────────────────────────────────────

pub fn apply_create_access_key(txn: &mut WriteTxn<'_>, key: &AccessKey) -> Result<()> {
    txn.put(
        Keyspace::AccessKeys,
        key.access_key.as_bytes(),
        &serde_json::to_vec(key).expect("access key serializes"),
    )
}

pub fn apply_delete_access_key(txn: &mut WriteTxn<'_>, access_key: &str) -> Result<()> {
    txn.delete(Keyspace::AccessKeys, access_key.as_bytes())?;
    Ok(())
}

/// Remove STS keys whose expiration precedes `now` (carried in the command
/// payload so replicas agree). Returns the local count.
pub fn apply_prune_expired_access_keys(txn: &mut WriteTxn<'_>, now: i64) -> Result<u64> {
    txn.delete_where(Keyspace::AccessKeys, |k, v| {
        decode_json::<AccessKey>(Keyspace::AccessKeys, k, v)
            .is_some_and(|key| key.is_expired(now))
    })
}

pub fn apply_create_user(txn: &mut WriteTxn<'_>, user: &IamUser) -> Result<()> {
    txn.put(
        Keyspace::IamUsers,
        user.user_id.as_bytes(),
        &serde_json::to_vec(user).expect("user record serializes"),
    )
}

pub fn apply_delete_user(txn: &mut WriteTxn<'_>, user_id: &str) -> Result<()> {
    txn.delete(Keyspace::IamUsers, user_id.as_bytes())?;
    Ok(())
}

pub fn apply_create_group(txn: &mut WriteTxn<'_>, group: &IamGroup) -> Result<()> {
    txn.put(
        Keyspace::IamGroups,
        group.name.as_bytes(),
        &serde_json::to_vec(group).expect("group record serializes"),
    )
}

pub fn apply_delete_group(txn: &mut WriteTxn<'_>, name: &str) -> Result<()> {
    txn.delete(Keyspace::IamGroups, name.as_bytes())?;
    Ok(())
}

pub fn apply_create_policy(txn: &mut WriteTxn<'_>, policy: &IamPolicyRecord) -> Result<()> {
    txn.put(
        Keyspace::IamPolicies,
        policy.name.as_bytes(),
        &serde_json::to_vec(policy).expect("policy record serializes"),
    )
}

pub fn apply_delete_policy(txn: &mut WriteTxn<'_>, name: &str) -> Result<()> {
    txn.delete(Keyspace::IamPolicies, name.as_bytes())?;
    Ok(())
}

pub fn apply_attach_user_policy(
    txn: &mut WriteTxn<'_>,
    user_id: &str,
    policy_name: &str,
) -> Result<()> {
    let Some(raw) = txn.get(Keyspace::IamUsers, user_id.as_bytes())? else {
        return Ok(());
    };
    let Some(mut user) = decode_json::<IamUser>(Keyspace::IamUsers, user_id.as_bytes(), &raw)
    else {
        return Ok(());
    };
    if !user.policy_names.iter().any(|n| n == policy_name) {
        user.policy_names.push(policy_name.to_string());
        txn.put(
            Keyspace::IamUsers,
            user_id.as_bytes(),
            &serde_json::to_vec(&user).expect("user record serializes"),
        )?;
    }
    Ok(())
}

//! # Referrals
//!
//! Using someone's referral code touches two accounts, so it runs as a
//! saga of single-account units:
//!
//! ```text
//! 1. bind    acting user: referred_by = code, bonus pending     (save)
//! 2. credit  owner: +0.0005 NC, referrals += 1, referee noted  (commit)
//! 3. settle  acting user: bonus no longer pending               (save)
//! ```
//!
//! Step 2 checks the owner's `referees` set first, so replaying it after a
//! partial failure can never pay twice. If step 2 gives up, the binding
//! stays and the pending flag tells [`Engine::settle_pending_referral`]
//! what is left to do.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Engine, EngineError, EngineResult, Staged};
use crate::config::REFERRAL_BONUS;
use crate::storage::LedgerStore;
use crate::transaction::{Transaction, TransactionDetail};
use crate::vault::UserId;

/// Result of a referral application or settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralReceipt {
    /// The user who entered the code.
    pub user_id: UserId,
    /// Owner of the code.
    pub referrer: UserId,
    pub code: String,
    pub bonus: Decimal,
    /// `false` if the owner had already been paid for this user.
    pub credited: bool,
}

impl<S: LedgerStore> Engine<S> {
    /// Binds `user_id` to the owner of `code` and pays the owner's bonus.
    ///
    /// # Errors
    ///
    /// `UnknownUser`, `AlreadyReferred`, `InvalidReferralCode`,
    /// `SelfReferral` before anything is written. `Storage` if the owner's
    /// credit could not be committed; the binding is kept and the bonus
    /// stays pending.
    pub fn apply_referral(&self, user_id: UserId, code: &str) -> EngineResult<ReferralReceipt> {
        let code = code.trim();

        let account = self.store.get(user_id)?;
        if account.referred_by().is_some() {
            warn!(user_id, code, "referral rejected, already referred");
            return Err(EngineError::AlreadyReferred(user_id));
        }
        let owner = self.store.find_by_referral_code(code).map_err(|err| {
            warn!(user_id, code, "referral rejected, unknown code");
            EngineError::from(err)
        })?;
        if owner.user_id == user_id {
            warn!(user_id, code, "referral rejected, own code");
            return Err(EngineError::SelfReferral(user_id));
        }

        self.bind_and_settle(user_id, owner.user_id, owner.referral_code())
    }

    /// Finishes a referral whose owner credit never went through.
    ///
    /// Returns `None` if `user_id` has nothing pending.
    pub fn settle_pending_referral(&self, user_id: UserId) -> EngineResult<Option<ReferralReceipt>> {
        let account = self.store.get(user_id)?;
        let code = match account.referred_by() {
            Some(code) if account.is_referral_bonus_pending() => code.to_string(),
            _ => return Ok(None),
        };
        let owner = self.store.find_by_referral_code(&code)?;

        info!(user_id, code = %code, "replaying pending referral");
        self.settle(user_id, owner.user_id, &code).map(Some)
    }

    fn bind_and_settle(
        &self,
        user_id: UserId,
        owner_id: UserId,
        code: &str,
    ) -> EngineResult<ReferralReceipt> {
        self.unit(user_id, "referral_bind", |mut account| {
            account.bind_referrer(code)?;
            Ok(Staged::Save(account, ()))
        })?;

        self.settle(user_id, owner_id, code)
    }

    /// Steps 2 and 3 of the saga. Safe to call any number of times.
    pub(super) fn settle(&self, user_id: UserId, owner_id: UserId, code: &str) -> EngineResult<ReferralReceipt> {
        let credited = self
            .unit(owner_id, "referral_credit", |mut owner| {
                if !owner.credit_referral(user_id, REFERRAL_BONUS)? {
                    return Ok(Staged::Unchanged(owner, false));
                }
                let tx = Transaction::new(
                    owner_id,
                    TransactionDetail::Referral {
                        referee: user_id,
                        code: code.to_string(),
                        bonus: REFERRAL_BONUS,
                    },
                );
                Ok(Staged::Record(owner, tx, true))
            })
            .map(|(_, credited)| credited)
            .map_err(|err| {
                warn!(user_id, owner_id, error = %err, "referral bonus not settled, left pending");
                err
            })?;

        self.unit(user_id, "referral_settle", |mut account| {
            if !account.is_referral_bonus_pending() {
                return Ok(Staged::Unchanged(account, ()));
            }
            account.mark_referral_settled();
            Ok(Staged::Save(account, ()))
        })?;

        info!(user_id, owner_id, code, credited, bonus = %REFERRAL_BONUS, "referral settled");

        Ok(ReferralReceipt {
            user_id,
            referrer: owner_id,
            code: code.to_string(),
            bonus: REFERRAL_BONUS,
            credited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::vault::Currency;

    fn pair() -> Engine<crate::storage::MemoryStore> {
        let engine = engine_with(true);
        engine.open_account(0xA, profile("owner"), None).unwrap();
        engine.open_account(0xB, profile("newbie"), None).unwrap();
        engine
    }

    #[test]
    fn referral_pays_owner_once() {
        let engine = pair();

        let receipt = engine.apply_referral(0xB, "QNT-A").unwrap();
        assert!(receipt.credited);
        assert_eq!(receipt.bonus, dec("0.0005"));

        let owner = engine.account(0xA).unwrap();
        assert_eq!(owner.referrals(), 1);
        assert_eq!(owner.earned(), dec("0.0005"));
        assert_eq!(owner.balance(Currency::NC), dec("0.0005"));

        let newbie = engine.account(0xB).unwrap();
        assert_eq!(newbie.referred_by(), Some("QNT-A"));
        assert!(!newbie.is_referral_bonus_pending());

        let err = engine.apply_referral(0xB, "QNT-A").unwrap_err();
        assert!(matches!(err, EngineError::AlreadyReferred(0xB)));
        assert_eq!(engine.account(0xA).unwrap().referrals(), 1);
        assert_eq!(engine.history(0xA).unwrap().len(), 1);
    }

    #[test]
    fn referral_is_recorded_on_owner() {
        let engine = pair();
        engine.apply_referral(0xB, "QNT-A").unwrap();

        let log = engine.history(0xA).unwrap();
        assert_eq!(log[0].detail.deltas(), vec![(Currency::NC, dec("0.0005"))]);
        assert!(engine.history(0xB).unwrap().is_empty());
    }

    #[test]
    fn own_code_is_rejected() {
        let engine = pair();
        let err = engine.apply_referral(0xA, "QNT-A").unwrap_err();
        assert!(matches!(err, EngineError::SelfReferral(0xA)));
        assert!(engine.account(0xA).unwrap().referred_by().is_none());
    }

    #[test]
    fn unknown_code_is_rejected() {
        let engine = pair();
        let err = engine.apply_referral(0xB, "QNT-FFFF").unwrap_err();
        assert!(matches!(err, EngineError::InvalidReferralCode(_)));
        assert!(engine.account(0xB).unwrap().referred_by().is_none());
    }

    #[test]
    fn onboarding_with_code() {
        let engine = engine_with(true);
        engine.open_account(0xA, profile("owner"), None).unwrap();

        let newbie = engine
            .open_account(0xC, profile("newbie"), Some(" QNT-A "))
            .unwrap();
        assert_eq!(newbie.referred_by(), Some("QNT-A"));
        assert!(!newbie.is_referral_bonus_pending());
        assert_eq!(engine.account(0xA).unwrap().referrals(), 1);
    }

    #[test]
    fn nothing_pending_settles_to_none() {
        let engine = pair();
        assert_eq!(engine.settle_pending_referral(0xB).unwrap(), None);

        engine.apply_referral(0xB, "QNT-A").unwrap();
        assert_eq!(engine.settle_pending_referral(0xB).unwrap(), None);
    }

    #[test]
    fn settle_after_paid_credit_does_not_pay_again() {
        let engine = pair();

        // Steps 1 and 2 land, step 3 never ran.
        engine
            .unit(0xB, "test", |mut account| {
                account.bind_referrer("QNT-A")?;
                Ok(Staged::Save(account, ()))
            })
            .unwrap();
        engine
            .unit(0xA, "test", |mut owner| {
                owner.credit_referral(0xB, REFERRAL_BONUS)?;
                Ok(Staged::Save(owner, ()))
            })
            .unwrap();

        let receipt = engine.settle_pending_referral(0xB).unwrap().unwrap();
        assert!(!receipt.credited);
        assert_eq!(engine.account(0xA).unwrap().referrals(), 1);
        assert!(!engine.account(0xB).unwrap().is_referral_bonus_pending());
    }
}

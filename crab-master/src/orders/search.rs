//! Card payment lookup across live and archived checks

use super::archive::ArchiveList;
use super::storage::CheckStorage;
use rust_decimal::Decimal;
use shared::error::AppResult;
use shared::order::Check;

/// 查找结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardMatch {
    pub serial: u64,
    pub holder: String,
    /// Found in an archive rather than the live store
    pub archived: bool,
}

fn match_in<'a>(
    mut checks: impl Iterator<Item = &'a Check>,
    card: &str,
    amount: Decimal,
) -> Option<(u64, String)> {
    checks.find_map(|check| {
        check
            .find_card_payment(card, amount)
            .and_then(|p| p.card.as_ref())
            .map(|c| (check.serial, c.holder.clone()))
    })
}

/// Search newest-first: live checks, then archives, loading each archive
/// only when the search reaches it
pub fn find_card_payment(
    storage: &CheckStorage,
    archives: &mut ArchiveList,
    card: &str,
    amount: Decimal,
) -> AppResult<Option<CardMatch>> {
    let live = storage.list_checks()?;
    if let Some((serial, holder)) = match_in(live.iter().rev(), card, amount) {
        return Ok(Some(CardMatch {
            serial,
            holder,
            archived: false,
        }));
    }

    for index in 0..archives.len() {
        let Some(data) = archives.ensure_loaded(index)? else {
            break;
        };
        if let Some((serial, holder)) = match_in(data.checks.iter().rev(), card, amount) {
            return Ok(Some(CardMatch {
                serial,
                holder,
                archived: true,
            }));
        }
    }
    Ok(None)
}

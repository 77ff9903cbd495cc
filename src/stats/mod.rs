//! Derived statistics over the in-memory attendee list.
//!
//! Everything here is pure and recomputed on every projection refresh.

use crate::models::{Attendee, SessionStats, TicketCounts, TicketType, TicketTypeStats};

/// Revenue attributed to one attendee.
///
/// Record shapes changed over time, so the amount is resolved in order:
/// explicit `individualAmount`, the per-type ticket map priced against
/// `ticket_types`, a plain ticket count priced at the first ticket type, the
/// original booking total, and finally zero.
pub fn attendee_revenue(attendee: &Attendee, ticket_types: &[TicketType]) -> f64 {
    if let Some(amount) = attendee.individual_amount.filter(|a| *a > 0.0) {
        return amount;
    }

    match &attendee.tickets {
        Some(TicketCounts::ByType(map)) => {
            let total: f64 = map
                .iter()
                .filter_map(|(name, count)| {
                    ticket_types
                        .iter()
                        .find(|t| &t.name == name)
                        .map(|t| t.price * f64::from(*count))
                })
                .sum();
            if total > 0.0 {
                return total;
            }
        }
        Some(TicketCounts::Count(count)) => {
            if let Some(first) = ticket_types.first() {
                let total = first.price * f64::from(*count);
                if total > 0.0 {
                    return total;
                }
            }
        }
        None => {}
    }

    attendee
        .original_booking
        .as_ref()
        .and_then(|b| b.total_amount)
        .filter(|a| *a > 0.0)
        .unwrap_or(0.0)
}

/// Whether an attendee holds a ticket of `name`.
fn holds_ticket_type(attendee: &Attendee, name: &str) -> bool {
    if attendee.ticket_type.as_deref() == Some(name) {
        return true;
    }
    attendee
        .tickets
        .as_ref()
        .is_some_and(|counts| counts.count_of(name) > 0)
}

/// Sold, available and revenue figures for one ticket type.
pub fn ticket_type_stats(ticket_type: &TicketType, attendees: &[Attendee]) -> TicketTypeStats {
    let sold = attendees
        .iter()
        .filter(|a| holds_ticket_type(a, &ticket_type.name))
        .count() as i64;
    let available = (ticket_type.capacity - sold).max(0);
    let percentage = if ticket_type.capacity > 0 {
        sold as f64 / ticket_type.capacity as f64 * 100.0
    } else {
        0.0
    };

    TicketTypeStats {
        name: ticket_type.name.clone(),
        capacity: ticket_type.capacity,
        price: ticket_type.price,
        sold,
        available,
        revenue: sold as f64 * ticket_type.price,
        percentage,
    }
}

/// Aggregate statistics for a session (or a whole legacy event).
pub fn session_stats(attendees: &[Attendee], ticket_types: &[TicketType]) -> SessionStats {
    let total_revenue = attendees
        .iter()
        .map(|a| attendee_revenue(a, ticket_types))
        .sum();
    let checked_in = attendees.iter().filter(|a| a.checked_in).count();
    let total_attendees = attendees.len();
    let check_in_rate = if total_attendees > 0 {
        checked_in as f64 / total_attendees as f64 * 100.0
    } else {
        0.0
    };

    SessionStats {
        total_revenue,
        total_attendees,
        checked_in,
        pending: total_attendees - checked_in,
        capacity: ticket_types.iter().map(|t| t.capacity).sum(),
        check_in_rate,
        ticket_types: ticket_types
            .iter()
            .map(|t| ticket_type_stats(t, attendees))
            .collect(),
    }
}

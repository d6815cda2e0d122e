use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use lapak_core::negotiate::{NegotiationEngine, NegotiationRequest, NegotiationResult};
use lapak_core::ports::{
    NegotiationStatus, NewNegotiationLog, NewTransaction, RecordStore, SellerDirectory,
    TransactionKind,
};
use lapak_core::slots::{quick_reply_labels, SLOT_MAX_PRICE, SLOT_PRICE, SLOT_PRODUCT, SLOT_QTY};
use lapak_core::{Entities, Intent, IntentAction};

use crate::extract::IntentExtractionService;
use crate::resolver::{SlotDisposition, SlotResolver};
use crate::session::{ConversationSessionStore, PendingState};

/// The reply sent back to the merchant, plus optional quick-reply labels
/// when a clarifying question was asked.
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorReply {
    pub message: String,
    pub quick_replies: Vec<String>,
    pub action: IntentAction,
}

impl OrchestratorReply {
    fn plain(action: IntentAction, message: String) -> Self {
        Self { message, quick_replies: Vec::new(), action }
    }
}

/// Routes each inbound message through extraction, slot filling, and the
/// action handlers, and persists the resulting records.
pub struct Orchestrator<D> {
    extraction: IntentExtractionService,
    sessions: Arc<ConversationSessionStore>,
    resolver: SlotResolver,
    negotiation: NegotiationEngine<D>,
    store: Arc<dyn RecordStore>,
}

impl<D: SellerDirectory> Orchestrator<D> {
    pub fn new(
        extraction: IntentExtractionService,
        sessions: Arc<ConversationSessionStore>,
        negotiation: NegotiationEngine<D>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let resolver = SlotResolver::new(Arc::clone(&sessions));
        Self { extraction, sessions, resolver, negotiation, store }
    }

    /// One conversational turn. Never fails; every internal problem folds
    /// into a polite Indonesian reply.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> OrchestratorReply {
        let correlation_id = Uuid::new_v4();
        info!(%correlation_id, user_id, text, "handling inbound message");

        let disposition = match self.sessions.pending(user_id).await {
            PendingState::AwaitingSlot { action, slot } => {
                self.sessions.append_message(user_id, "user", text, action).await;
                self.resolver.resume(user_id, action, &slot, text).await
            }
            PendingState::Idle => {
                let intent = self.extraction.extract(text).await;
                self.sessions.append_message(user_id, "user", text, intent.action).await;

                match intent.action {
                    IntentAction::Greeting => {
                        return self.finish(user_id, greeting_reply()).await;
                    }
                    IntentAction::AskMarket => {
                        let reply = market_intel_reply(&intent.entities);
                        return self.finish(user_id, reply).await;
                    }
                    IntentAction::RequestPromo => {
                        return self.finish(user_id, promo_reply()).await;
                    }
                    IntentAction::Unknown => {
                        return self.finish(user_id, help_reply()).await;
                    }
                    _ => self.resolver.begin(user_id, &intent).await,
                }
            }
        };

        match disposition {
            SlotDisposition::Ask { action, prompt, slot } => {
                info!(%correlation_id, user_id, slot, "asking for missing slot");
                let reply = OrchestratorReply {
                    message: prompt.question.clone(),
                    quick_replies: quick_reply_labels(&prompt.suggestions),
                    action,
                };
                self.sessions.append_message(user_id, "assistant", &reply.message, action).await;
                reply
            }
            SlotDisposition::Complete { action, entities } => {
                let reply = self
                    .dispatch(correlation_id, user_id, action, &entities, text)
                    .await;
                self.finish(user_id, reply).await
            }
        }
    }

    /// Record the assistant's reply and reset task state for the session.
    async fn finish(&self, user_id: &str, reply: OrchestratorReply) -> OrchestratorReply {
        self.sessions.append_message(user_id, "assistant", &reply.message, reply.action).await;
        self.sessions.finish_task(user_id).await;
        reply
    }

    async fn dispatch(
        &self,
        correlation_id: Uuid,
        user_id: &str,
        action: IntentAction,
        entities: &Entities,
        raw_text: &str,
    ) -> OrchestratorReply {
        match action {
            IntentAction::RecordSale => {
                self.record_sale(correlation_id, user_id, entities, raw_text).await
            }
            IntentAction::RecordExpense => {
                self.record_expense(correlation_id, user_id, entities, raw_text).await
            }
            IntentAction::OrderRestock => {
                self.order_restock(correlation_id, user_id, entities, raw_text).await
            }
            IntentAction::CheckStock => self.check_stock(user_id, entities).await,
            // Slot filling only runs for the four actions above.
            _ => OrchestratorReply::plain(action, help_reply_text()),
        }
    }

    async fn record_sale(
        &self,
        correlation_id: Uuid,
        user_id: &str,
        entities: &Entities,
        raw_text: &str,
    ) -> OrchestratorReply {
        let product = entities.text(SLOT_PRODUCT).unwrap_or("produk").to_string();
        let qty = entities.number(SLOT_QTY).unwrap_or(1.0);
        let price = entities.number(SLOT_PRICE).unwrap_or(0.0);
        let total = qty * price;

        self.persist_transaction(
            correlation_id,
            NewTransaction {
                user_id: user_id.to_string(),
                kind: TransactionKind::Sale,
                product_name: product.clone(),
                qty,
                price_per_unit: price,
                total_amount: total,
                raw_text: raw_text.to_string(),
            },
        )
        .await;

        OrchestratorReply::plain(
            IntentAction::RecordSale,
            format!(
                "✅ Penjualan tercatat!\n\n📦 Produk: {product}\n📊 Jumlah: {qty:.0}\n💰 Harga: Rp {price:.0}\n💵 Total: Rp {total:.0}\n\nTerima kasih! Semoga laris manis 🙏"
            ),
        )
    }

    async fn record_expense(
        &self,
        correlation_id: Uuid,
        user_id: &str,
        entities: &Entities,
        raw_text: &str,
    ) -> OrchestratorReply {
        let product = entities.text(SLOT_PRODUCT).unwrap_or("pengeluaran").to_string();
        let qty = entities.number(SLOT_QTY).filter(|value| *value > 0.0).unwrap_or(1.0);
        let price = entities.number(SLOT_PRICE).unwrap_or(0.0);
        let total = qty * price;

        self.persist_transaction(
            correlation_id,
            NewTransaction {
                user_id: user_id.to_string(),
                kind: TransactionKind::Expense,
                product_name: product.clone(),
                qty,
                price_per_unit: price,
                total_amount: total,
                raw_text: raw_text.to_string(),
            },
        )
        .await;

        OrchestratorReply::plain(
            IntentAction::RecordExpense,
            format!(
                "💸 Pengeluaran tercatat!\n\n📝 Item: {product}\n💰 Biaya: Rp {total:.0}\n\nPengeluaran sudah dicatat di buku kas."
            ),
        )
    }

    async fn order_restock(
        &self,
        correlation_id: Uuid,
        user_id: &str,
        entities: &Entities,
        raw_text: &str,
    ) -> OrchestratorReply {
        let request = NegotiationRequest {
            product: entities.text(SLOT_PRODUCT).unwrap_or("barang").to_string(),
            qty: entities.number(SLOT_QTY).unwrap_or(0.0),
            max_price: entities.number(SLOT_MAX_PRICE).unwrap_or(0.0),
        };

        let result = self.negotiation.negotiate(request).await;
        self.persist_negotiation(correlation_id, user_id, &result, raw_text).await;

        if result.success {
            OrchestratorReply::plain(
                IntentAction::OrderRestock,
                format_negotiation_success(&result),
            )
        } else {
            OrchestratorReply::plain(IntentAction::OrderRestock, format_negotiation_failed(&result))
        }
    }

    async fn check_stock(&self, user_id: &str, entities: &Entities) -> OrchestratorReply {
        let Some(product) = entities.text(SLOT_PRODUCT) else {
            return OrchestratorReply::plain(
                IntentAction::CheckStock,
                "📦 Produk apa yang ingin dicek stoknya?".to_string(),
            );
        };

        let message = match self.store.stock_level(user_id, product).await {
            Ok(Some(stock)) => format!(
                "📦 Stok {}: {:.0} {}\n\nHarga jual min: Rp {:.0}",
                stock.product_name, stock.stock_qty, stock.unit, stock.min_sell_price
            ),
            Ok(None) => {
                format!("📦 Stok {product} belum tercatat.\n\nMau tambahkan ke inventory?")
            }
            Err(error) => {
                warn!(user_id, product, error = %error, "stock lookup failed");
                format!("📦 Stok {product} belum tercatat.\n\nMau tambahkan ke inventory?")
            }
        };

        OrchestratorReply::plain(IntentAction::CheckStock, message)
    }

    /// Persistence never blocks the merchant-facing confirmation; failures
    /// are logged and the reply stands.
    async fn persist_transaction(&self, correlation_id: Uuid, transaction: NewTransaction) {
        if let Err(error) = self.store.create_transaction(transaction).await {
            warn!(
                %correlation_id,
                error = %error,
                event_name = "runtime.transaction_persist_failed",
                "transaction write failed"
            );
        }
    }

    async fn persist_negotiation(
        &self,
        correlation_id: Uuid,
        user_id: &str,
        result: &NegotiationResult,
        raw_text: &str,
    ) {
        let transcript =
            serde_json::to_value(&result.messages).unwrap_or(serde_json::Value::Null);

        let log = NewNegotiationLog {
            buyer_id: user_id.to_string(),
            seller_id: result.seller_id.clone(),
            product_name: result.product_name.clone(),
            initial_offer: result.final_price.unwrap_or(0.0),
            final_price: result.final_price.unwrap_or(0.0),
            status: if result.success {
                NegotiationStatus::Success
            } else {
                NegotiationStatus::Failed
            },
            transcript,
        };

        if let Err(error) = self.store.create_negotiation_log(log).await {
            warn!(
                %correlation_id,
                error = %error,
                event_name = "runtime.negotiation_persist_failed",
                "negotiation log write failed"
            );
        }

        if result.success {
            self.persist_transaction(
                correlation_id,
                NewTransaction {
                    user_id: user_id.to_string(),
                    kind: TransactionKind::Purchase,
                    product_name: result.product_name.clone(),
                    qty: result.quantity,
                    price_per_unit: result.final_price.unwrap_or(0.0),
                    total_amount: result.total_amount.unwrap_or(0.0),
                    raw_text: raw_text.to_string(),
                },
            )
            .await;
        }
    }
}

fn greeting_reply() -> OrchestratorReply {
    OrchestratorReply::plain(
        IntentAction::Greeting,
        "👋 Halo! Selamat datang di Lapak!\n\nSaya asisten bisnis Anda. Anda bisa:\n• 📝 Catat penjualan: \"laku nasi 10 porsi\"\n• 🛒 Pesan barang: \"cari beras 25 kg\"\n• 📊 Cek harga: \"harga cabai berapa\"\n• 📦 Cek stok: \"stok telur berapa\"\n\nAda yang bisa saya bantu? 😊"
            .to_string(),
    )
}

fn promo_reply() -> OrchestratorReply {
    OrchestratorReply::plain(
        IntentAction::RequestPromo,
        "🎨 Baik, saya akan buatkan materi promosi untuk Anda!\nMohon tunggu sebentar...".to_string(),
    )
}

fn help_reply() -> OrchestratorReply {
    OrchestratorReply::plain(IntentAction::Unknown, help_reply_text())
}

fn help_reply_text() -> String {
    "🤔 Maaf, saya belum mengerti maksud Anda.\n\nAnda bisa:\n• Catat penjualan: \"Tadi laku nasi 10 porsi\"\n• Pesan barang: \"Cari beras 25 kg\"\n• Cek harga: \"Harga cabai berapa\"".to_string()
}

fn market_intel_reply(entities: &Entities) -> OrchestratorReply {
    const MARKET_PRICES: [(&str, &str); 4] = [
        (
            "beras",
            "📊 Harga Beras di Pasar:\n• Premium: Rp 11.500 - 13.000/kg\n• Medium: Rp 10.000 - 11.000/kg\n\n📈 Tren: Stabil",
        ),
        (
            "cabai",
            "📊 Harga Cabai di Pasar:\n• Merah Keriting: Rp 40.000 - 50.000/kg\n• Rawit: Rp 45.000 - 55.000/kg\n\n📈 Tren: Naik (musim hujan)",
        ),
        (
            "telur",
            "📊 Harga Telur di Pasar:\n• Ayam Negeri: Rp 2.200 - 2.500/butir\n• Ayam Kampung: Rp 3.500 - 4.000/butir\n\n📈 Tren: Stabil",
        ),
        (
            "minyak",
            "📊 Harga Minyak Goreng:\n• Curah: Rp 14.000 - 15.000/liter\n• Kemasan: Rp 16.000 - 18.000/liter\n\n📈 Tren: Stabil",
        ),
    ];

    let message = match entities.text(SLOT_PRODUCT) {
        Some(product) => {
            let lowered = product.to_lowercase();
            MARKET_PRICES
                .iter()
                .find(|(name, _)| lowered.contains(name) || name.contains(lowered.as_str()))
                .map(|(_, info)| (*info).to_string())
                .unwrap_or_else(|| {
                    format!(
                        "📊 Info harga {product} belum tersedia.\n\nCoba tanya: beras, cabai, telur, atau minyak"
                    )
                })
        }
        None => "📊 Mau cek harga apa?\n\nContoh: \"harga beras berapa\" atau \"tren cabai\""
            .to_string(),
    };

    OrchestratorReply::plain(IntentAction::AskMarket, message)
}

fn format_negotiation_success(result: &NegotiationResult) -> String {
    format!(
        "🎉 Negosiasi Berhasil!\n\n📦 Produk: {}\n📊 Jumlah: {:.0} unit\n💰 Harga: Rp {:.0}/unit\n💵 Total: Rp {:.0}\n🏪 Penjual: {}\n\nPesanan akan segera diproses!",
        result.product_name,
        result.quantity,
        result.final_price.unwrap_or(0.0),
        result.total_amount.unwrap_or(0.0),
        result.seller_name.as_deref().unwrap_or("-"),
    )
}

fn format_negotiation_failed(result: &NegotiationResult) -> String {
    let mut message = format!(
        "😔 Negosiasi Gagal\n\n📦 Produk: {}\n❌ Alasan: {}\n\n",
        result.product_name,
        result.error_message.as_deref().unwrap_or("tidak diketahui"),
    );

    if !result.messages.is_empty() {
        message.push_str("📜 Log Negosiasi:\n");
        for entry in &result.messages {
            message.push_str(&format!("• {}\n", entry.content));
        }
    }

    message.push_str("\nCoba dengan budget lebih tinggi atau produk lain.");
    message
}

use crate::ui::state::AppState;

/// Returns `(user, recipient)` when the user asks to connect with a valid form.
pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> Option<(String, String)> {
    let mut request = None;

    ui.vertical_centered(|ui| {
        ui.heading("Hub Chat");
        ui.separator();

        if state.loading {
            ui.spinner();
            ui.label("Loading...");
            return;
        }

        if let Some(error) = &state.error {
            ui.colored_label(egui::Color32::RED, error);
        }

        ui.label("Your name:");
        ui.text_edit_singleline(&mut state.form.user_name);

        ui.checkbox(&mut state.form.broadcast, "Broadcast room");
        if !state.form.broadcast {
            ui.label("Recipient:");
            ui.text_edit_singleline(&mut state.form.recipient);
        }

        if ui.button("Connect").clicked() {
            request = state.begin_connect();
        }
    });

    request
}

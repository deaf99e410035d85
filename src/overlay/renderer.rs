//! Direct3D 11 renderer for UI draw data
//!
//! Texture ids are raw `ID3D11ShaderResourceView` pointers, so callers can
//! draw their own textures next to the font atlas.

use super::frame::{projection, scissor};
use crate::error::{Error, Result};
use imgui::{Context, DrawCmd, DrawCmdParams, DrawData, DrawIdx, DrawVert, FontSource, TextureId};
use std::ffi::c_void;
use std::mem::size_of;
use std::ptr;
use windows::core::{s, Interface, PCSTR};
use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;
use windows::Win32::Graphics::Direct3D::{ID3DBlob, D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST};
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;

const VERTEX_SHADER: &str = r#"
cbuffer vertexBuffer : register(b0) { float4x4 ProjectionMatrix; };
struct VS_INPUT { float2 pos : POSITION; float4 col : COLOR0; float2 uv : TEXCOORD0; };
struct PS_INPUT { float4 pos : SV_POSITION; float4 col : COLOR0; float2 uv : TEXCOORD0; };
PS_INPUT main(VS_INPUT input) {
    PS_INPUT output;
    output.pos = mul(ProjectionMatrix, float4(input.pos.xy, 0.f, 1.f));
    output.col = input.col;
    output.uv = input.uv;
    return output;
}
"#;

const PIXEL_SHADER: &str = r#"
struct PS_INPUT { float4 pos : SV_POSITION; float4 col : COLOR0; float2 uv : TEXCOORD0; };
sampler sampler0;
Texture2D texture0;
float4 main(PS_INPUT input) : SV_Target {
    return input.col * texture0.Sample(sampler0, input.uv);
}
"#;

const VERTEX_HEADROOM: usize = 5000;
const INDEX_HEADROOM: usize = 10000;

fn dx(what: &'static str) -> impl Fn(windows::core::Error) -> Error {
    move |e| Error::InitFailed(format!("{}: {}", what, e))
}

fn created<T>(slot: Option<T>, what: &str) -> Result<T> {
    slot.ok_or_else(|| Error::InitFailed(format!("{} returned no object", what)))
}

fn compile(source: &str, target: PCSTR) -> Result<ID3DBlob> {
    let mut code = None;
    let mut errors = None;
    let compiled = unsafe {
        D3DCompile(
            source.as_ptr() as *const c_void,
            source.len(),
            PCSTR::null(),
            None,
            None,
            s!("main"),
            target,
            0,
            0,
            &mut code,
            Some(&mut errors),
        )
    };
    if let Err(e) = compiled {
        let detail = errors
            .map(|blob| String::from_utf8_lossy(blob_bytes(&blob)).into_owned())
            .unwrap_or_default();
        return Err(Error::InitFailed(format!("shader compile failed: {} {}", e, detail)));
    }
    created(code, "D3DCompile")
}

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}

fn dynamic_buffer(device: &ID3D11Device, bytes: usize, bind: D3D11_BIND_FLAG) -> Result<ID3D11Buffer> {
    let desc = D3D11_BUFFER_DESC {
        ByteWidth: bytes as u32,
        Usage: D3D11_USAGE_DYNAMIC,
        BindFlags: bind.0 as u32,
        CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
        MiscFlags: 0,
        StructureByteStride: 0,
    };
    let mut buffer = None;
    unsafe { device.CreateBuffer(&desc, None, Some(&mut buffer)) }.map_err(dx("CreateBuffer"))?;
    created(buffer, "CreateBuffer")
}

pub struct Renderer {
    device: ID3D11Device,
    vertex_shader: ID3D11VertexShader,
    pixel_shader: ID3D11PixelShader,
    layout: ID3D11InputLayout,
    constants: ID3D11Buffer,
    sampler: ID3D11SamplerState,
    blend: ID3D11BlendState,
    rasterizer: ID3D11RasterizerState,
    depth: ID3D11DepthStencilState,
    font: ID3D11ShaderResourceView,
    vertices: ID3D11Buffer,
    vertex_capacity: usize,
    indices: ID3D11Buffer,
    index_capacity: usize,
}

impl Renderer {
    pub fn new(device: &ID3D11Device, imgui: &mut Context) -> Result<Self> {
        imgui.set_renderer_name(Some(format!("mdb_bridge-d3d11 {}", env!("CARGO_PKG_VERSION"))));
        imgui
            .io_mut()
            .backend_flags
            .insert(imgui::BackendFlags::RENDERER_HAS_VTX_OFFSET);

        let vs_blob = compile(VERTEX_SHADER, s!("vs_4_0"))?;
        let ps_blob = compile(PIXEL_SHADER, s!("ps_4_0"))?;

        let mut vertex_shader = None;
        let mut pixel_shader = None;
        let mut layout = None;
        let elements = [
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: s!("POSITION"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: 0,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: s!("TEXCOORD"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R32G32_FLOAT,
                InputSlot: 0,
                AlignedByteOffset: 8,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
            D3D11_INPUT_ELEMENT_DESC {
                SemanticName: s!("COLOR"),
                SemanticIndex: 0,
                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                InputSlot: 0,
                AlignedByteOffset: 16,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            },
        ];

        let mut blend_desc = D3D11_BLEND_DESC::default();
        blend_desc.RenderTarget[0] = D3D11_RENDER_TARGET_BLEND_DESC {
            BlendEnable: true.into(),
            SrcBlend: D3D11_BLEND_SRC_ALPHA,
            DestBlend: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOp: D3D11_BLEND_OP_ADD,
            SrcBlendAlpha: D3D11_BLEND_ONE,
            DestBlendAlpha: D3D11_BLEND_INV_SRC_ALPHA,
            BlendOpAlpha: D3D11_BLEND_OP_ADD,
            RenderTargetWriteMask: D3D11_COLOR_WRITE_ENABLE_ALL.0 as u8,
        };
        let rasterizer_desc = D3D11_RASTERIZER_DESC {
            FillMode: D3D11_FILL_SOLID,
            CullMode: D3D11_CULL_NONE,
            ScissorEnable: true.into(),
            DepthClipEnable: true.into(),
            ..Default::default()
        };
        let keep = D3D11_DEPTH_STENCILOP_DESC {
            StencilFailOp: D3D11_STENCIL_OP_KEEP,
            StencilDepthFailOp: D3D11_STENCIL_OP_KEEP,
            StencilPassOp: D3D11_STENCIL_OP_KEEP,
            StencilFunc: D3D11_COMPARISON_ALWAYS,
        };
        let depth_desc = D3D11_DEPTH_STENCIL_DESC {
            DepthEnable: false.into(),
            DepthWriteMask: D3D11_DEPTH_WRITE_MASK_ALL,
            DepthFunc: D3D11_COMPARISON_ALWAYS,
            StencilEnable: false.into(),
            FrontFace: keep,
            BackFace: keep,
            ..Default::default()
        };
        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_WRAP,
            AddressV: D3D11_TEXTURE_ADDRESS_WRAP,
            AddressW: D3D11_TEXTURE_ADDRESS_WRAP,
            ComparisonFunc: D3D11_COMPARISON_ALWAYS,
            ..Default::default()
        };

        let (mut blend, mut rasterizer, mut depth, mut sampler) = (None, None, None, None);
        unsafe {
            device
                .CreateVertexShader(blob_bytes(&vs_blob), None, Some(&mut vertex_shader))
                .map_err(dx("CreateVertexShader"))?;
            device
                .CreatePixelShader(blob_bytes(&ps_blob), None, Some(&mut pixel_shader))
                .map_err(dx("CreatePixelShader"))?;
            device
                .CreateInputLayout(&elements, blob_bytes(&vs_blob), Some(&mut layout))
                .map_err(dx("CreateInputLayout"))?;
            device
                .CreateBlendState(&blend_desc, Some(&mut blend))
                .map_err(dx("CreateBlendState"))?;
            device
                .CreateRasterizerState(&rasterizer_desc, Some(&mut rasterizer))
                .map_err(dx("CreateRasterizerState"))?;
            device
                .CreateDepthStencilState(&depth_desc, Some(&mut depth))
                .map_err(dx("CreateDepthStencilState"))?;
            device
                .CreateSamplerState(&sampler_desc, Some(&mut sampler))
                .map_err(dx("CreateSamplerState"))?;
        }

        let font = Self::upload_fonts(device, imgui)?;

        Ok(Renderer {
            device: device.clone(),
            vertex_shader: created(vertex_shader, "CreateVertexShader")?,
            pixel_shader: created(pixel_shader, "CreatePixelShader")?,
            layout: created(layout, "CreateInputLayout")?,
            constants: dynamic_buffer(device, size_of::<[[f32; 4]; 4]>(), D3D11_BIND_CONSTANT_BUFFER)?,
            sampler: created(sampler, "CreateSamplerState")?,
            blend: created(blend, "CreateBlendState")?,
            rasterizer: created(rasterizer, "CreateRasterizerState")?,
            depth: created(depth, "CreateDepthStencilState")?,
            font,
            vertices: dynamic_buffer(device, VERTEX_HEADROOM * size_of::<DrawVert>(), D3D11_BIND_VERTEX_BUFFER)?,
            vertex_capacity: VERTEX_HEADROOM,
            indices: dynamic_buffer(device, INDEX_HEADROOM * size_of::<DrawIdx>(), D3D11_BIND_INDEX_BUFFER)?,
            index_capacity: INDEX_HEADROOM,
        })
    }

    fn upload_fonts(device: &ID3D11Device, imgui: &mut Context) -> Result<ID3D11ShaderResourceView> {
        let fonts = imgui.fonts();
        if fonts.fonts().is_empty() {
            fonts.add_font(&[FontSource::DefaultFontData { config: None }]);
        }
        let atlas = fonts.build_rgba32_texture();
        let desc = D3D11_TEXTURE2D_DESC {
            Width: atlas.width,
            Height: atlas.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        let data = D3D11_SUBRESOURCE_DATA {
            pSysMem: atlas.data.as_ptr() as *const c_void,
            SysMemPitch: atlas.width * 4,
            SysMemSlicePitch: 0,
        };
        let mut texture = None;
        let mut view = None;
        unsafe {
            device
                .CreateTexture2D(&desc, Some(&data), Some(&mut texture))
                .map_err(dx("CreateTexture2D"))?;
            let texture = created(texture, "CreateTexture2D")?;
            device
                .CreateShaderResourceView(&texture, None, Some(&mut view))
                .map_err(dx("CreateShaderResourceView"))?;
        }
        let view = created(view, "CreateShaderResourceView")?;
        fonts.tex_id = TextureId::from(view.as_raw() as usize);
        Ok(view)
    }

    fn reserve(&mut self, vertices: usize, indices: usize) -> Result<()> {
        if vertices > self.vertex_capacity {
            self.vertex_capacity = vertices + VERTEX_HEADROOM;
            self.vertices = dynamic_buffer(
                &self.device,
                self.vertex_capacity * size_of::<DrawVert>(),
                D3D11_BIND_VERTEX_BUFFER,
            )?;
        }
        if indices > self.index_capacity {
            self.index_capacity = indices + INDEX_HEADROOM;
            self.indices = dynamic_buffer(
                &self.device,
                self.index_capacity * size_of::<DrawIdx>(),
                D3D11_BIND_INDEX_BUFFER,
            )?;
        }
        Ok(())
    }

    fn upload(&mut self, context: &ID3D11DeviceContext, draw_data: &DrawData) -> Result<()> {
        self.reserve(draw_data.total_vtx_count as usize, draw_data.total_idx_count as usize)?;
        let mut vtx = D3D11_MAPPED_SUBRESOURCE::default();
        let mut idx = D3D11_MAPPED_SUBRESOURCE::default();
        let mut cb = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            context
                .Map(&self.vertices, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut vtx))
                .map_err(dx("Map vertices"))?;
            context
                .Map(&self.indices, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut idx))
                .map_err(dx("Map indices"))?;
            let mut vtx_dst = vtx.pData as *mut DrawVert;
            let mut idx_dst = idx.pData as *mut DrawIdx;
            for list in draw_data.draw_lists() {
                let v = list.vtx_buffer();
                let i = list.idx_buffer();
                ptr::copy_nonoverlapping(v.as_ptr(), vtx_dst, v.len());
                ptr::copy_nonoverlapping(i.as_ptr(), idx_dst, i.len());
                vtx_dst = vtx_dst.add(v.len());
                idx_dst = idx_dst.add(i.len());
            }
            context.Unmap(&self.vertices, 0);
            context.Unmap(&self.indices, 0);

            context
                .Map(&self.constants, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut cb))
                .map_err(dx("Map constants"))?;
            let matrix = projection(draw_data.display_pos, draw_data.display_size);
            ptr::write_unaligned(cb.pData as *mut [[f32; 4]; 4], matrix);
            context.Unmap(&self.constants, 0);
        }
        Ok(())
    }

    fn bind_state(&self, context: &ID3D11DeviceContext, draw_data: &DrawData) {
        let viewport = D3D11_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: draw_data.display_size[0],
            Height: draw_data.display_size[1],
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        let stride = size_of::<DrawVert>() as u32;
        let offset = 0u32;
        let vertices = Some(self.vertices.clone());
        unsafe {
            context.RSSetViewports(Some(&[viewport]));
            context.IASetInputLayout(&self.layout);
            context.IASetVertexBuffers(0, 1, Some(&vertices), Some(&stride), Some(&offset));
            context.IASetIndexBuffer(&self.indices, DXGI_FORMAT_R16_UINT, 0);
            context.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            context.VSSetShader(&self.vertex_shader, None);
            context.VSSetConstantBuffers(0, Some(&[Some(self.constants.clone())]));
            context.PSSetShader(&self.pixel_shader, None);
            context.PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));
            context.OMSetBlendState(&self.blend, Some(&[0.0f32; 4]), 0xFFFF_FFFF);
            context.OMSetDepthStencilState(&self.depth, 0);
            context.RSSetState(&self.rasterizer);
        }
    }

    /// Draw one frame into the currently bound render target.
    pub fn render(&mut self, context: &ID3D11DeviceContext, draw_data: &DrawData) -> Result<()> {
        let [width, height] = draw_data.display_size;
        if width <= 0.0 || height <= 0.0 || draw_data.total_idx_count == 0 {
            return Ok(());
        }
        self.upload(context, draw_data)?;
        self.bind_state(context, draw_data);

        let mut global_vtx = 0usize;
        let mut global_idx = 0usize;
        for list in draw_data.draw_lists() {
            for cmd in list.commands() {
                match cmd {
                    DrawCmd::Elements {
                        count,
                        cmd_params:
                            DrawCmdParams {
                                clip_rect,
                                texture_id,
                                vtx_offset,
                                idx_offset,
                            },
                    } => {
                        let Some([left, top, right, bottom]) =
                            scissor(clip_rect, draw_data.display_pos, draw_data.display_size)
                        else {
                            continue;
                        };
                        let rect = RECT { left, top, right, bottom };
                        let raw = texture_id.id() as *mut c_void;
                        let view = unsafe { ID3D11ShaderResourceView::from_raw_borrowed(&raw) }
                            .unwrap_or(&self.font)
                            .clone();
                        unsafe {
                            context.RSSetScissorRects(Some(&[rect]));
                            context.PSSetShaderResources(0, Some(&[Some(view)]));
                            context.DrawIndexed(
                                count as u32,
                                (idx_offset + global_idx) as u32,
                                (vtx_offset + global_vtx) as i32,
                            );
                        }
                    }
                    DrawCmd::ResetRenderState => self.bind_state(context, draw_data),
                    DrawCmd::RawCallback { callback, raw_cmd } => unsafe { callback(list.raw(), raw_cmd) },
                }
            }
            global_idx += list.idx_buffer().len();
            global_vtx += list.vtx_buffer().len();
        }
        Ok(())
    }
}
